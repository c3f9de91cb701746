//! Core types and simulation loop shared across the jumpbots workspace.

use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

/// Convenience alias for associating side data with agents.
pub type AgentMap<T> = SecondaryMap<AgentId, T>;

/// Number of directional probes in the sensor ring.
pub const NUM_PROBES: usize = 8;
/// Number of sensor inputs handed to each agent policy (probes + velocity signs).
pub const INPUT_SIZE: usize = NUM_PROBES + 2;
/// Number of scores in a policy's action vector.
pub const ACTION_COUNT: usize = 3;

/// One sensor sweep: probe hits followed by vertical and horizontal velocity signs.
pub type SensorReading = [f32; INPUT_SIZE];

fn velocity_sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Axis-aligned 2D position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Lightweight axis-aligned rectangle used for platforms, feet strips, and probe tests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Construct a new rectangle from its top-left corner and extents.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns true when the two rectangles share any area.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// Liang-Barsky test of a line segment against this rectangle.
    #[must_use]
    pub fn intersects_segment(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> bool {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;
        let clips = [
            (-dx, x0 - self.x),
            (dx, self.x + self.width - x0),
            (-dy, y0 - self.y),
            (dy, self.y + self.height - y0),
        ];
        for (p, q) in clips {
            if p.abs() <= f32::EPSILON {
                if q < 0.0 {
                    return false;
                }
            } else {
                let t = q / p;
                if p < 0.0 {
                    t_min = t_min.max(t);
                } else {
                    t_max = t_max.min(t);
                }
                if t_min > t_max {
                    return false;
                }
            }
        }
        true
    }
}

/// High level simulation clock (ticks processed since generation start).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Discrete horizontal steering decision resolved from a policy's action vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    Left,
    Right,
    #[default]
    Neutral,
}

impl Action {
    /// Maps a slot index onto an action; anything outside the mapped range is `Neutral`.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Left,
            1 => Self::Right,
            _ => Self::Neutral,
        }
    }

    /// Arg-max over an action score vector. Ties resolve toward `Neutral`.
    #[must_use]
    pub fn from_scores(scores: &[f32; ACTION_COUNT]) -> Self {
        let mut best = ACTION_COUNT - 1;
        for (index, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = index;
            }
        }
        Self::from_index(best)
    }
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a jumpbots world.
///
/// Defaults reproduce the classic 480x800 field this simulation grew out of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpbotsConfig {
    /// Width of the visible field in world units.
    pub window_width: f32,
    /// Height of the visible field in world units.
    pub window_height: f32,
    /// Horizontal margin platforms must keep from either edge.
    pub field_margin: f32,
    /// Number of platform slots cycling through the field.
    pub platform_count: usize,
    /// Platform extents.
    pub platform_width: f32,
    pub platform_height: f32,
    /// Vertical spacing between consecutive platforms at generation.
    pub platform_gap: f32,
    /// Agent sprite extents (drive the collision strip and wrap threshold).
    pub agent_width: f32,
    pub agent_height: f32,
    /// Height of the thin landing strip under the agent's feet.
    pub collision_margin: f32,
    /// Fixed spawn point used for every population member.
    pub spawn_x: f32,
    pub spawn_y: f32,
    /// Horizontal speed applied by a left/right decision.
    pub horizontal_speed: f32,
    /// Clamp on downward velocity.
    pub max_fall_speed: f32,
    /// Upward launch speed applied by a jump.
    pub max_jump_speed: f32,
    /// Sub-step added to the jump phase counter every tick.
    pub jump_tick_step: f32,
    /// Quadratic coefficient of the jump curve.
    pub jump_power: f32,
    /// Extra deceleration applied while still ascending.
    pub ascent_bias: f32,
    /// Screen height above which the agent is pinned and the world scrolls instead.
    pub jump_threshold: f32,
    /// Clamp on the shared per-tick scroll offset.
    pub max_scroll_speed: f32,
    /// Reach of each directional sensor probe.
    pub probe_length: f32,
    /// Fitness increment for landing on a platform.
    pub landing_reward: f32,
    /// Fitness increment for pushing the world down this tick.
    pub progress_reward: f32,
    /// Fitness penalty applied when an agent falls out of the field.
    pub death_penalty: f32,
    /// Fitness penalty applied when an agent stalls out.
    pub stagnation_penalty: f32,
    /// Ticks without upward progress before an agent is eliminated.
    pub stagnation_threshold: u32,
    /// Bounded random attempts before platform placement pins deterministically.
    pub placement_attempts: u32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
}

impl Default for JumpbotsConfig {
    fn default() -> Self {
        Self {
            window_width: 480.0,
            window_height: 800.0,
            field_margin: 5.0,
            platform_count: 7,
            platform_width: 100.0,
            platform_height: 20.0,
            platform_gap: 150.0,
            agent_width: 64.0,
            agent_height: 64.0,
            collision_margin: 10.0,
            spawn_x: 200.0,
            spawn_y: 200.0,
            horizontal_speed: 4.0,
            max_fall_speed: 10.0,
            max_jump_speed: 10.0,
            jump_tick_step: 0.4,
            jump_power: 0.08,
            ascent_bias: 2.0,
            jump_threshold: 210.0,
            max_scroll_speed: 5.0,
            probe_length: 150.0,
            landing_reward: 0.05,
            progress_reward: 0.1,
            death_penalty: 30.0,
            stagnation_penalty: 10.0,
            stagnation_threshold: 600,
            placement_attempts: 30,
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl JumpbotsConfig {
    /// Validates the configuration before a world is built around it.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.window_width <= 0.0 || self.window_height <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "window dimensions must be positive",
            ));
        }
        if self.platform_width <= 0.0 || self.platform_height <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "platform dimensions must be positive",
            ));
        }
        if self.agent_width <= 0.0 || self.agent_height <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "agent dimensions must be positive",
            ));
        }
        if self.platform_count == 0 {
            return Err(WorldError::InvalidConfig(
                "platform_count must be non-zero",
            ));
        }
        if self.window_width <= self.platform_width + 2.0 * self.field_margin {
            return Err(WorldError::InvalidConfig(
                "platform must fit between the field margins",
            ));
        }
        if self.platform_gap <= self.platform_height {
            return Err(WorldError::InvalidConfig(
                "platform_gap must exceed platform_height",
            ));
        }
        if self.jump_threshold <= 0.0 || self.jump_threshold >= self.window_height {
            return Err(WorldError::InvalidConfig(
                "jump_threshold must lie inside the window",
            ));
        }
        if self.collision_margin <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "collision_margin must be positive",
            ));
        }
        if self.horizontal_speed < 0.0
            || self.max_fall_speed <= 0.0
            || self.max_jump_speed <= 0.0
            || self.jump_tick_step <= 0.0
            || self.jump_power < 0.0
            || self.ascent_bias < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "kinematic parameters must be non-negative, speeds positive",
            ));
        }
        if self.max_scroll_speed <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "max_scroll_speed must be positive",
            ));
        }
        if self.probe_length <= 0.0 {
            return Err(WorldError::InvalidConfig("probe_length must be positive"));
        }
        if self.stagnation_threshold == 0 {
            return Err(WorldError::InvalidConfig(
                "stagnation_threshold must be non-zero",
            ));
        }
        if self.placement_attempts == 0 {
            return Err(WorldError::InvalidConfig(
                "placement_attempts must be non-zero",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        if !(0.0..self.window_width).contains(&self.spawn_x)
            || !(0.0..self.window_height).contains(&self.spawn_y)
        {
            return Err(WorldError::InvalidConfig(
                "spawn point must lie inside the window",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Stable identity of a platform slot. Recycling repositions a slot, never destroys it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PlatformId(pub u32);

/// One platform slot in the scrolling field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Platform {
    id: PlatformId,
    bounds: Rect,
}

impl Platform {
    /// Slot identity, stable for the whole run.
    #[must_use]
    pub const fn id(&self) -> PlatformId {
        self.id
    }

    /// Current rectangle occupied by the platform.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Reposition the platform in place, identity preserved.
    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }
}

/// Owns the scrolling set of platforms and answers geometric queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformField {
    platforms: Vec<Platform>,
    window_width: f32,
    window_height: f32,
    margin: f32,
    platform_width: f32,
    platform_height: f32,
    placement_attempts: u32,
}

impl PlatformField {
    /// Generates the initial layout: vertically spaced slots with random horizontal
    /// positions inside the field margins. Deterministic under a seeded RNG.
    #[must_use]
    pub fn generate(config: &JumpbotsConfig, rng: &mut SmallRng) -> Self {
        let mut field = Self {
            platforms: Vec::with_capacity(config.platform_count),
            window_width: config.window_width,
            window_height: config.window_height,
            margin: config.field_margin,
            platform_width: config.platform_width,
            platform_height: config.platform_height,
            placement_attempts: config.placement_attempts,
        };
        let mut prev_y = config.field_margin;
        for slot in 0..config.platform_count {
            let y = prev_y + config.platform_gap;
            prev_y = y;
            let x = field.place_x(y, rng);
            field.platforms.push(Platform {
                id: PlatformId(slot as u32),
                bounds: Rect::new(x, y, config.platform_width, config.platform_height),
            });
        }
        field
    }

    /// Picks a horizontal position for a platform row at `y`.
    ///
    /// Random candidates that would overlap an existing platform are retried a
    /// bounded number of times; exhaustion pins the platform to the far edge so
    /// placement never loops unboundedly.
    fn place_x(&self, y: f32, rng: &mut SmallRng) -> f32 {
        let min = self.margin;
        let max = self.window_width - self.platform_width - self.margin;
        if max <= min {
            return min;
        }
        for _ in 0..self.placement_attempts {
            let x = rng.random_range(min..max);
            let candidate = Rect::new(x, y, self.platform_width, self.platform_height);
            if !self
                .platforms
                .iter()
                .any(|platform| platform.bounds.intersects(&candidate))
            {
                return x;
            }
        }
        max
    }

    /// Moves the platform back above the visible area with a fresh horizontal
    /// position, preserving its identity. Returns false for an unknown id.
    pub fn recycle(&mut self, id: PlatformId, rng: &mut SmallRng) -> bool {
        let Some(index) = self.platforms.iter().position(|p| p.id == id) else {
            return false;
        };
        let y = -self.platform_height;
        let x = self.place_x(y, rng);
        let bounds = &mut self.platforms[index].bounds;
        bounds.x = x;
        bounds.y = y;
        true
    }

    /// Recycles every platform that scrolled past the bottom edge, returning how many.
    pub fn recycle_fallen(&mut self, rng: &mut SmallRng) -> usize {
        let fallen: Vec<PlatformId> = self
            .platforms
            .iter()
            .filter(|platform| platform.bounds.y > self.window_height)
            .map(|platform| platform.id)
            .collect();
        for id in &fallen {
            self.recycle(*id, rng);
        }
        fallen.len()
    }

    /// Shifts every platform down by `offset` world units.
    pub fn scroll(&mut self, offset: f32) {
        for platform in &mut self.platforms {
            platform.bounds.y += offset;
        }
    }

    /// The current live platform set.
    #[must_use]
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Mutable access to the platform slots (scenario setup, external editors).
    #[must_use]
    pub fn platforms_mut(&mut self) -> &mut [Platform] {
        &mut self.platforms
    }

    /// O(n) bounding-box query over the platform set.
    pub fn platforms_near(&self, region: Rect) -> impl Iterator<Item = &Platform> {
        self.platforms
            .iter()
            .filter(move |platform| platform.bounds.intersects(&region))
    }

    /// Look up a platform by slot identity.
    #[must_use]
    pub fn get(&self, id: PlatformId) -> Option<&Platform> {
        self.platforms.iter().find(|platform| platform.id == id)
    }
}

/// One simulated player's kinematic state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub position: Position,
    pub velocity_x: f32,
    /// Launch component of the vertical velocity, reset by a jump.
    pub velocity_y: f32,
    /// Derived fall speed from the latest integration step.
    pub vy: f32,
    /// Jump phase counter advanced every tick once a jump starts.
    pub jump_tick: f32,
    /// Consecutive ticks without net upward progress.
    pub stagnation_timer: u32,
}

impl Agent {
    /// Creates an agent at the configured spawn point.
    #[must_use]
    pub fn spawn(config: &JumpbotsConfig) -> Self {
        Self {
            position: Position::new(config.spawn_x, config.spawn_y),
            velocity_x: 0.0,
            velocity_y: 0.0,
            vy: 0.0,
            jump_tick: 0.0,
            stagnation_timer: 0,
        }
    }

    /// Advances the jump phase and integrates one tick of motion.
    ///
    /// The vertical curve is `velocity_y + jump_power * jump_tick^2` clamped to
    /// `max_fall_speed`; while the raw value is still negative the agent is
    /// ascending and an extra bias steepens the deceleration. Horizontal motion
    /// wraps across the window edges at the sprite's half width.
    pub fn integrate(&mut self, config: &JumpbotsConfig) {
        self.jump_tick += config.jump_tick_step;
        let raw = self.velocity_y + config.jump_power * self.jump_tick * self.jump_tick;
        let mut vy = raw.min(config.max_fall_speed);
        if raw < 0.0 {
            vy -= config.ascent_bias;
        }
        self.vy = vy;
        self.position.y += vy;
        self.position.x += self.velocity_x;

        let half = config.agent_width * 0.5;
        if self.position.x < -half {
            self.position.x = config.window_width - half;
        } else if self.position.x > config.window_width - half {
            self.position.x = -half;
        }
    }

    /// Applies a steering decision to the horizontal velocity.
    pub fn apply_decision(&mut self, action: Action, config: &JumpbotsConfig) {
        self.velocity_x = match action {
            Action::Left => -config.horizontal_speed,
            Action::Right => config.horizontal_speed,
            Action::Neutral => 0.0,
        };
    }

    /// Launches the agent upward and restarts the jump phase.
    pub fn jump(&mut self, config: &JumpbotsConfig) {
        self.velocity_y = -config.max_jump_speed;
        self.vy = -config.max_jump_speed;
        self.jump_tick = 0.0;
    }

    /// Anchor point of the sensor probes and landing strip: center of the feet.
    #[must_use]
    pub fn probe_anchor(&self, config: &JumpbotsConfig) -> (f32, f32) {
        (
            self.position.x + config.agent_width * 0.5,
            self.position.y + config.agent_height,
        )
    }

    /// Thin strip under the sprite used as the authoritative landing signal.
    #[must_use]
    pub fn feet_rect(&self, config: &JumpbotsConfig) -> Rect {
        Rect::new(
            self.position.x + config.agent_width * 0.25,
            self.position.y + config.agent_height,
            config.agent_width * 0.5,
            config.collision_margin,
        )
    }

    /// True when the feet strip overlaps any platform.
    #[must_use]
    pub fn collide(&self, field: &PlatformField, config: &JumpbotsConfig) -> bool {
        let feet = self.feet_rect(config);
        field.platforms_near(feet).next().is_some()
    }

    /// True while the agent is falling (or momentarily at the apex).
    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.vy >= 0.0
    }

    /// True when the agent has fallen below the visible field.
    #[must_use]
    pub fn is_dead(&self, config: &JumpbotsConfig) -> bool {
        self.position.y >= config.window_height
    }

    /// True when the agent has gone too long without upward progress.
    #[must_use]
    pub fn is_stagnant(&self, threshold: u32) -> bool {
        self.stagnation_timer > threshold
    }
}

/// Casts the fixed probe bundle from an agent's collision point.
///
/// Probe geometry is a pure function of agent position and size; probes anchored
/// close to either horizontal edge cast a mirrored twin from the wrapped-around
/// position so sensing obeys the same wraparound the agent does.
#[derive(Debug, Clone)]
pub struct SensorArray {
    directions: [(f32, f32); NUM_PROBES],
    probe_length: f32,
    window_width: f32,
    anchor_dx: f32,
    anchor_dy: f32,
}

impl SensorArray {
    /// Precomputes the probe ring for the given configuration.
    #[must_use]
    pub fn new(config: &JumpbotsConfig) -> Self {
        let mut directions = [(0.0_f32, 0.0_f32); NUM_PROBES];
        for (slot, direction) in directions.iter_mut().enumerate() {
            let angle = std::f32::consts::TAU * slot as f32 / NUM_PROBES as f32
                - std::f32::consts::FRAC_PI_2;
            *direction = (angle.cos(), angle.sin());
        }
        Self {
            directions,
            probe_length: config.probe_length,
            window_width: config.window_width,
            anchor_dx: config.agent_width * 0.5,
            anchor_dy: config.agent_height,
        }
    }

    /// Sweeps every probe against the platform set and reports hits plus the
    /// agent's velocity signs. Idempotent for an unchanged agent and field.
    #[must_use]
    pub fn sense(&self, agent: &Agent, field: &PlatformField) -> SensorReading {
        let anchor_x = agent.position.x + self.anchor_dx;
        let anchor_y = agent.position.y + self.anchor_dy;
        let mirrored = self.wrapped_anchor(anchor_x);

        let mut reading = [0.0_f32; INPUT_SIZE];
        for (slot, direction) in self.directions.iter().enumerate() {
            let mut hit = self.probe_hits(anchor_x, anchor_y, *direction, field);
            if !hit && let Some(wrapped_x) = mirrored {
                hit = self.probe_hits(wrapped_x, anchor_y, *direction, field);
            }
            reading[slot] = if hit { 1.0 } else { 0.0 };
        }
        reading[NUM_PROBES] = velocity_sign(agent.vy);
        reading[NUM_PROBES + 1] = velocity_sign(agent.velocity_x);
        reading
    }

    fn probe_hits(&self, anchor_x: f32, anchor_y: f32, direction: (f32, f32), field: &PlatformField) -> bool {
        let end_x = anchor_x + direction.0 * self.probe_length;
        let end_y = anchor_y + direction.1 * self.probe_length;
        field
            .platforms()
            .iter()
            .any(|platform| platform.bounds().intersects_segment(anchor_x, anchor_y, end_x, end_y))
    }

    fn wrapped_anchor(&self, anchor_x: f32) -> Option<f32> {
        if anchor_x < self.probe_length {
            Some(anchor_x + self.window_width)
        } else if anchor_x > self.window_width - self.probe_length {
            Some(anchor_x - self.window_width)
        } else {
            None
        }
    }
}

/// Thin trait object used to drive policy evaluations without coupling to
/// concrete policy crates.
pub trait PolicyRunner: Send + Sync {
    /// Static identifier of the policy implementation.
    fn kind(&self) -> &'static str;

    /// Produce action scores for the provided sensors.
    fn decide(&mut self, inputs: &SensorReading) -> [f32; ACTION_COUNT];
}

/// Per-agent evaluation bookkeeping held on behalf of the evolutionary collaborator.
pub struct AgentRecord {
    runner: Box<dyn PolicyRunner>,
    /// Fitness accumulator, mutated in place over the generation.
    pub fitness: f32,
    /// Latest sensor sweep handed to the policy.
    pub sensors: SensorReading,
    /// Latest resolved decision.
    pub action: Action,
    scroll_candidate: f32,
}

impl fmt::Debug for AgentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRecord")
            .field("kind", &self.runner.kind())
            .field("fitness", &self.fitness)
            .field("action", &self.action)
            .finish()
    }
}

impl AgentRecord {
    /// Binds a policy with a zeroed fitness accumulator.
    #[must_use]
    pub fn new(runner: Box<dyn PolicyRunner>) -> Self {
        Self {
            runner,
            fitness: 0.0,
            sensors: [0.0; INPUT_SIZE],
            action: Action::Neutral,
            scroll_candidate: 0.0,
        }
    }

    /// Identifier of the bound policy.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.runner.kind()
    }

    /// Evaluates the bound policy on a fresh reading and resolves the decision.
    pub fn decide(&mut self, reading: SensorReading) -> Action {
        self.sensors = reading;
        let scores = self.runner.decide(&self.sensors);
        self.action = Action::from_scores(&scores);
        self.action
    }
}

/// Why an agent left the live set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EliminationCause {
    /// Fell below the visible field.
    Fell,
    /// Exceeded the stagnation threshold without upward progress.
    Stagnated,
}

/// Terminal verdict reported when an agent is removed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Elimination {
    pub id: AgentId,
    pub cause: EliminationCause,
    /// Final fitness after the terminal adjustment.
    pub fitness: f32,
    pub tick: Tick,
}

/// Summary emitted after processing a world tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub live_count: usize,
    pub eliminations: usize,
    pub scroll_offset: f32,
    pub score: f32,
}

/// Copy of one agent's public state for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub agent: Agent,
    pub fitness: f32,
    pub action: Action,
}

/// World-plus-agents snapshot handed to the per-tick observer.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub summary: TickSummary,
    pub platforms: Vec<Platform>,
    pub agents: Vec<AgentState>,
}

/// Per-tick observer hook; the seam where a renderer would attach.
pub trait RunObserver: Send {
    fn on_tick(&mut self, frame: &FrameSnapshot);

    /// Cooperative cancellation, polled once per tick boundary.
    fn should_halt(&self) -> bool {
        false
    }
}

/// No-op observer.
#[derive(Debug, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {
    fn on_tick(&mut self, _frame: &FrameSnapshot) {}
}

/// Result of driving a generation to termination.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// One verdict per eliminated member, in elimination order.
    pub verdicts: Vec<Elimination>,
    /// Cumulative scroll score at termination.
    pub score: f32,
    /// Ticks processed by this generation run.
    pub ticks: u64,
}

/// Dense population storage with generational handles and order-preserving removal.
#[derive(Debug, Default)]
pub struct Population {
    slots: SlotMap<AgentId, usize>,
    handles: Vec<AgentId>,
    agents: Vec<Agent>,
}

impl Population {
    /// Create an empty population.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a population with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            handles: Vec::with_capacity(capacity),
            agents: Vec::with_capacity(capacity),
        }
    }

    /// Number of live agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns true when no agents are alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Iterate over live handles in stable population order.
    pub fn iter_handles(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.handles.iter().copied()
    }

    /// Borrow the dense agent storage in population order.
    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Returns the dense index for `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: AgentId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Returns true if `id` refers to a live agent.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.slots.contains_key(id)
    }

    /// Insert a new agent and return its handle.
    pub fn insert(&mut self, agent: Agent) -> AgentId {
        let index = self.agents.len();
        self.agents.push(agent);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Borrow an agent by handle.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.index_of(id).and_then(|index| self.agents.get(index))
    }

    /// Mutably borrow an agent by handle.
    #[must_use]
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        let index = self.index_of(id)?;
        self.agents.get_mut(index)
    }

    /// Remove `id`, returning its state if it was present.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let index = self.slots.remove(id)?;
        let removed = self.agents.swap_remove(index);
        let removed_handle = self.handles.swap_remove(index);
        debug_assert_eq!(removed_handle, id);
        if index < self.handles.len() {
            let moved = self.handles[index];
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = index;
            }
        }
        Some(removed)
    }

    /// Remove all agents whose ids are contained in `dead`, preserving iteration order.
    pub fn remove_many(&mut self, dead: &HashSet<AgentId>) -> usize {
        if dead.is_empty() {
            return 0;
        }
        let mut write = 0;
        for read in 0..self.handles.len() {
            let id = self.handles[read];
            if dead.contains(&id) {
                self.slots.remove(id);
                continue;
            }
            if write != read {
                self.handles[write] = id;
                self.agents.swap(read, write);
            }
            if let Some(slot) = self.slots.get_mut(id) {
                *slot = write;
            }
            write += 1;
        }
        let removed = self.handles.len().saturating_sub(write);
        self.handles.truncate(write);
        self.agents.truncate(write);
        removed
    }

    /// Clear all stored agents.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.handles.clear();
        self.agents.clear();
    }
}

/// Drives one fixed-timestep tick across the whole live population.
pub struct World {
    config: JumpbotsConfig,
    tick: Tick,
    rng: SmallRng,
    field: PlatformField,
    sensors: SensorArray,
    population: Population,
    records: AgentMap<AgentRecord>,
    pending_removals: Vec<(AgentId, EliminationCause)>,
    verdicts: Vec<Elimination>,
    observer: Box<dyn RunObserver>,
    running: bool,
    score: f32,
    last_scroll_offset: f32,
    last_eliminations: usize,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("live_count", &self.population.len())
            .field("score", &self.score)
            .finish()
    }
}

impl World {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: JumpbotsConfig) -> Result<Self, WorldError> {
        Self::with_observer(config, Box::new(NullObserver))
    }

    /// Instantiate a new world with a per-tick observer attached.
    pub fn with_observer(
        config: JumpbotsConfig,
        observer: Box<dyn RunObserver>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let field = PlatformField::generate(&config, &mut rng);
        let sensors = SensorArray::new(&config);
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            field,
            sensors,
            population: Population::new(),
            records: AgentMap::new(),
            pending_removals: Vec::new(),
            verdicts: Vec::new(),
            observer,
            running: false,
            score: 0.0,
            last_scroll_offset: 0.0,
            last_eliminations: 0,
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Spawn one population member at the fixed spawn point with a zeroed
    /// fitness accumulator and the supplied decision policy bound to it.
    pub fn spawn_member(&mut self, policy: Box<dyn PolicyRunner>) -> AgentId {
        let id = self.population.insert(Agent::spawn(&self.config));
        self.records.insert(id, AgentRecord::new(policy));
        id
    }

    /// Spawn a whole population in order, returning the handles.
    pub fn spawn_population(
        &mut self,
        policies: impl IntoIterator<Item = Box<dyn PolicyRunner>>,
    ) -> Vec<AgentId> {
        policies
            .into_iter()
            .map(|policy| self.spawn_member(policy))
            .collect()
    }

    fn stage_recycle(&mut self) {
        self.field.recycle_fallen(&mut self.rng);
    }

    fn stage_advance(&mut self) {
        let handles: Vec<AgentId> = self.population.iter_handles().collect();
        for id in handles {
            let Some(agent) = self.population.get_mut(id) else {
                continue;
            };
            agent.integrate(&self.config);
            let reading = self.sensors.sense(agent, &self.field);
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            let action = record.decide(reading);
            agent.apply_decision(action, &self.config);

            record.scroll_candidate = 0.0;
            if agent.position.y <= self.config.jump_threshold {
                record.scroll_candidate = (-agent.vy).max(0.0);
                agent.position.y = self.config.jump_threshold;
            }
        }
    }

    fn stage_collisions(&mut self) {
        let handles: Vec<AgentId> = self.population.iter_handles().collect();
        for id in handles {
            let Some(agent) = self.population.get_mut(id) else {
                continue;
            };
            // Edge-triggered: an agent still ascending from a recent jump never
            // re-fires while overlapping the same platform.
            if !agent.is_descending() {
                continue;
            }
            if agent.collide(&self.field, &self.config) {
                agent.jump(&self.config);
                if let Some(record) = self.records.get_mut(id) {
                    record.fitness += self.config.landing_reward;
                }
            }
        }
    }

    fn stage_elimination(&mut self, tick: Tick) {
        let threshold = self.config.stagnation_threshold;
        for id in self.population.iter_handles() {
            let Some(agent) = self.population.get(id) else {
                continue;
            };
            if agent.is_dead(&self.config) {
                self.pending_removals.push((id, EliminationCause::Fell));
            } else if agent.is_stagnant(threshold) {
                self.pending_removals.push((id, EliminationCause::Stagnated));
            }
        }

        if self.pending_removals.is_empty() {
            self.last_eliminations = 0;
            return;
        }

        let mut dead = HashSet::new();
        for (id, cause) in self.pending_removals.drain(..) {
            if dead.contains(&id) || !self.population.contains(id) {
                continue;
            }
            let penalty = match cause {
                EliminationCause::Fell => self.config.death_penalty,
                EliminationCause::Stagnated => self.config.stagnation_penalty,
            };
            let mut fitness = 0.0;
            if let Some(record) = self.records.get_mut(id) {
                record.fitness -= penalty;
                fitness = record.fitness;
            }
            self.records.remove(id);
            dead.insert(id);
            self.verdicts.push(Elimination {
                id,
                cause,
                fitness,
                tick,
            });
        }
        self.last_eliminations = dead.len();
        self.population.remove_many(&dead);
    }

    fn stage_scroll(&mut self) -> f32 {
        let offset = self
            .records
            .values()
            .map(|record| OrderedFloat(record.scroll_candidate))
            .max()
            .map_or(0.0, OrderedFloat::into_inner)
            .clamp(0.0, self.config.max_scroll_speed);
        if offset > 0.0 {
            self.field.scroll(offset);
            self.score += offset;
        }
        self.last_scroll_offset = offset;
        offset
    }

    fn stage_progress(&mut self) {
        let handles: Vec<AgentId> = self.population.iter_handles().collect();
        for id in handles {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            let progressed = record.scroll_candidate > 0.0;
            if progressed {
                record.fitness += self.config.progress_reward;
            }
            if let Some(agent) = self.population.get_mut(id) {
                agent.stagnation_timer = if progressed {
                    0
                } else {
                    agent.stagnation_timer.saturating_add(1)
                };
            }
        }
    }

    fn emit_frame(&mut self, summary: TickSummary) {
        let agents: Vec<AgentState> = self
            .population
            .iter_handles()
            .filter_map(|id| {
                let agent = self.population.get(id)?.clone();
                let record = self.records.get(id)?;
                Some(AgentState {
                    id,
                    agent,
                    fitness: record.fitness,
                    action: record.action,
                })
            })
            .collect();
        let frame = FrameSnapshot {
            summary,
            platforms: self.field.platforms().to_vec(),
            agents,
        };
        self.observer.on_tick(&frame);
    }

    /// Execute one simulation tick pipeline, returning its summary.
    pub fn step(&mut self) -> TickSummary {
        let next_tick = self.tick.next();

        self.stage_recycle();
        self.stage_advance();
        self.stage_collisions();
        self.stage_elimination(next_tick);
        let scroll_offset = self.stage_scroll();
        self.stage_progress();

        let summary = TickSummary {
            tick: next_tick,
            live_count: self.population.len(),
            eliminations: self.last_eliminations,
            scroll_offset,
            score: self.score,
        };
        self.emit_frame(summary);
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
        self.tick = next_tick;
        summary
    }

    /// Drive ticks until the live set empties or `halt` is called, then hand
    /// the accumulated verdicts back to the evolutionary collaborator.
    pub fn run_generation(&mut self) -> GenerationOutcome {
        self.running = true;
        let started = self.tick;
        while self.running && !self.population.is_empty() {
            self.step();
            if self.observer.should_halt() {
                self.running = false;
            }
        }
        self.running = false;
        GenerationOutcome {
            verdicts: std::mem::take(&mut self.verdicts),
            score: self.score,
            ticks: self.tick.0 - started.0,
        }
    }

    /// Request cooperative termination; checked once per tick boundary.
    pub fn halt(&mut self) {
        self.running = false;
    }

    /// Whether a generation run is currently in flight.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub const fn config(&self) -> &JumpbotsConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Cumulative scroll score.
    #[must_use]
    pub const fn score(&self) -> f32 {
        self.score
    }

    /// Scroll offset applied on the most recent tick.
    #[must_use]
    pub const fn last_scroll_offset(&self) -> f32 {
        self.last_scroll_offset
    }

    /// Read-only access to the platform field.
    #[must_use]
    pub const fn field(&self) -> &PlatformField {
        &self.field
    }

    /// Mutable access to the platform field.
    #[must_use]
    pub fn field_mut(&mut self) -> &mut PlatformField {
        &mut self.field
    }

    /// Read-only access to the live population.
    #[must_use]
    pub const fn population(&self) -> &Population {
        &self.population
    }

    /// Borrow an agent by handle.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.population.get(id)
    }

    /// Mutably borrow an agent by handle.
    #[must_use]
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.population.get_mut(id)
    }

    /// Borrow the evaluation record bound to an agent.
    #[must_use]
    pub fn record(&self, id: AgentId) -> Option<&AgentRecord> {
        self.records.get(id)
    }

    /// Current fitness of a live agent.
    #[must_use]
    pub fn fitness_of(&self, id: AgentId) -> Option<f32> {
        self.records.get(id).map(|record| record.fitness)
    }

    /// Recompute the sensor reading for a live agent against the current field.
    #[must_use]
    pub fn sensor_reading(&self, id: AgentId) -> Option<SensorReading> {
        let agent = self.population.get(id)?;
        Some(self.sensors.sense(agent, &self.field))
    }

    /// Verdicts accumulated since the last `run_generation`.
    #[must_use]
    pub fn verdicts(&self) -> &[Elimination] {
        &self.verdicts
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Borrow the world RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JumpbotsConfig {
        JumpbotsConfig {
            rng_seed: Some(0xDEAD_BEEF),
            ..JumpbotsConfig::default()
        }
    }

    fn seeded_rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn rect_intersection_is_strict_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        let touching = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&touching));
    }

    #[test]
    fn segment_test_hits_crossing_and_misses_parallel() {
        let rect = Rect::new(10.0, 10.0, 20.0, 5.0);
        assert!(rect.intersects_segment(0.0, 12.0, 40.0, 12.0));
        assert!(rect.intersects_segment(15.0, 0.0, 15.0, 30.0));
        assert!(!rect.intersects_segment(0.0, 0.0, 40.0, 0.0));
        assert!(!rect.intersects_segment(0.0, 20.0, 5.0, 40.0));
    }

    #[test]
    fn segment_fully_inside_counts_as_hit() {
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(rect.intersects_segment(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn action_argmax_resolves_scores() {
        assert_eq!(Action::from_scores(&[0.9, 0.1, 0.2]), Action::Left);
        assert_eq!(Action::from_scores(&[0.1, 0.9, 0.2]), Action::Right);
        assert_eq!(Action::from_scores(&[0.1, 0.2, 0.9]), Action::Neutral);
    }

    #[test]
    fn degenerate_scores_resolve_neutral() {
        assert_eq!(Action::from_scores(&[0.5, 0.5, 0.5]), Action::Neutral);
        assert_eq!(Action::from_scores(&[0.0, 0.0, 0.0]), Action::Neutral);
        assert_eq!(Action::from_index(7), Action::Neutral);
    }

    #[test]
    fn config_rejects_degenerate_geometry() {
        let mut config = test_config();
        config.window_width = 0.0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.platform_width = 500.0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.probe_length = 0.0;
        assert!(config.validate().is_err());

        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn initial_platforms_are_spaced_and_margined() {
        let config = test_config();
        let mut rng = seeded_rng();
        let field = PlatformField::generate(&config, &mut rng);
        let platforms = field.platforms();
        assert_eq!(platforms.len(), config.platform_count);

        let mut expected_y = config.field_margin + config.platform_gap;
        for platform in platforms {
            let bounds = platform.bounds();
            assert!((bounds.y - expected_y).abs() < f32::EPSILON);
            assert!(bounds.x >= config.field_margin);
            assert!(bounds.x <= config.window_width - config.platform_width - config.field_margin);
            expected_y += config.platform_gap;
        }
    }

    #[test]
    fn generation_is_deterministic_for_a_seed() {
        let config = test_config();
        let field_a = PlatformField::generate(&config, &mut SmallRng::seed_from_u64(7));
        let field_b = PlatformField::generate(&config, &mut SmallRng::seed_from_u64(7));
        assert_eq!(field_a.platforms(), field_b.platforms());
    }

    #[test]
    fn recycle_moves_platform_above_window_and_keeps_identity() {
        let config = test_config();
        let mut rng = seeded_rng();
        let mut field = PlatformField::generate(&config, &mut rng);
        let id = field.platforms()[0].id();

        field.scroll(2_000.0);
        let recycled = field.recycle_fallen(&mut rng);
        assert_eq!(recycled, config.platform_count);

        let platform = field.get(id).expect("slot survives recycling");
        assert!((platform.bounds().y - -config.platform_height).abs() < f32::EPSILON);
        assert!(platform.bounds().x >= config.field_margin);
    }

    #[test]
    fn placement_falls_back_to_far_edge_when_attempts_exhaust() {
        let config = JumpbotsConfig {
            platform_width: 400.0,
            rng_seed: Some(1),
            ..test_config()
        };
        let mut rng = seeded_rng();
        let mut field = PlatformField::generate(&config, &mut rng);
        // Park a blocker across the entire placeable span at the respawn row.
        let blocker_y = -config.platform_height;
        field.platforms[0].bounds = Rect::new(config.field_margin, blocker_y, 400.0, 20.0);

        let x = field.place_x(blocker_y, &mut rng);
        let pinned = config.window_width - config.platform_width - config.field_margin;
        assert!((x - pinned).abs() < f32::EPSILON);
    }

    #[test]
    fn unsupported_agent_falls() {
        let config = test_config();
        let mut agent = Agent::spawn(&config);
        let before = agent.position.y;
        agent.integrate(&config);
        let base_step = config.jump_power * config.jump_tick_step * config.jump_tick_step;
        assert!(agent.position.y >= before + base_step - f32::EPSILON);
        assert!(agent.is_descending());
    }

    #[test]
    fn fall_speed_clamp_holds_for_any_jump_phase() {
        let config = test_config();
        let mut agent = Agent::spawn(&config);
        agent.jump_tick = 10_000.0;
        for _ in 0..32 {
            agent.integrate(&config);
            assert!(agent.vy <= config.max_fall_speed);
        }
    }

    #[test]
    fn horizontal_wrap_keeps_x_in_window_band() {
        let config = test_config();
        let half = config.agent_width * 0.5;
        let mut agent = Agent::spawn(&config);
        agent.apply_decision(Action::Left, &config);
        for _ in 0..1_000 {
            agent.integrate(&config);
            assert!(agent.position.x >= -half);
            assert!(agent.position.x < config.window_width);
        }
        agent.apply_decision(Action::Right, &config);
        for _ in 0..1_000 {
            agent.integrate(&config);
            assert!(agent.position.x >= -half);
            assert!(agent.position.x < config.window_width);
        }
    }

    #[test]
    fn feet_overlap_collides_and_jump_relaunches() {
        let config = test_config();
        let mut rng = seeded_rng();
        let mut field = PlatformField::generate(&config, &mut rng);
        let mut agent = Agent::spawn(&config);

        let feet = agent.feet_rect(&config);
        field.platforms[0].bounds = feet;
        assert!(agent.collide(&field, &config));

        agent.jump(&config);
        assert!((agent.velocity_y - -config.max_jump_speed).abs() < f32::EPSILON);
        assert!((agent.vy - -config.max_jump_speed).abs() < f32::EPSILON);
        assert!(agent.jump_tick.abs() < f32::EPSILON);
        assert!(!agent.is_descending());
    }

    #[test]
    fn ascent_decelerates_distinctly_from_descent() {
        let config = test_config();
        let mut agent = Agent::spawn(&config);
        agent.jump(&config);
        agent.integrate(&config);
        // Raw curve is still negative right after launch, so the bias applies.
        assert!(agent.vy < -config.max_jump_speed);
    }

    #[test]
    fn sense_is_idempotent_without_world_mutation() {
        let config = test_config();
        let mut rng = seeded_rng();
        let field = PlatformField::generate(&config, &mut rng);
        let sensors = SensorArray::new(&config);
        let agent = Agent::spawn(&config);

        let first = sensors.sense(&agent, &field);
        let second = sensors.sense(&agent, &field);
        assert_eq!(first, second);
    }

    #[test]
    fn probe_detects_platform_below() {
        let config = test_config();
        let mut rng = seeded_rng();
        let mut field = PlatformField::generate(&config, &mut rng);
        let sensors = SensorArray::new(&config);
        let agent = Agent::spawn(&config);

        let (anchor_x, anchor_y) = agent.probe_anchor(&config);
        field.platforms[0].bounds = Rect::new(
            anchor_x - config.platform_width * 0.5,
            anchor_y + 50.0,
            config.platform_width,
            config.platform_height,
        );
        // Park the remaining slots far outside every probe's reach.
        for platform in field.platforms.iter_mut().skip(1) {
            platform.bounds.y = 10_000.0;
        }

        let reading = sensors.sense(&agent, &field);
        // Slot 4 is the downward cardinal in the ring.
        assert!((reading[4] - 1.0).abs() < f32::EPSILON);
        assert!((reading[0]).abs() < f32::EPSILON);
    }

    #[test]
    fn mirrored_probe_sees_across_the_wrap() {
        let config = test_config();
        let mut rng = seeded_rng();
        let mut field = PlatformField::generate(&config, &mut rng);
        let sensors = SensorArray::new(&config);

        let mut agent = Agent::spawn(&config);
        // Anchor hugs the left edge; the only platform hugs the right edge at
        // the same height, reachable solely through the wrapped twin.
        agent.position.x = -config.agent_width * 0.5;
        agent.position.y = 200.0;
        let (anchor_x, anchor_y) = agent.probe_anchor(&config);
        assert!(anchor_x < config.probe_length);

        field.platforms[0].bounds = Rect::new(
            config.window_width - config.platform_width - config.field_margin,
            anchor_y - config.platform_height * 0.5,
            config.platform_width,
            config.platform_height,
        );
        for platform in field.platforms.iter_mut().skip(1) {
            platform.bounds.y = 10_000.0;
        }

        let reading = sensors.sense(&agent, &field);
        assert!(
            reading[..NUM_PROBES].iter().any(|hit| *hit > 0.0),
            "wrapped probe should report the platform across the seam"
        );
    }

    #[test]
    fn velocity_sign_slots_follow_motion() {
        let config = test_config();
        let mut rng = seeded_rng();
        let mut field = PlatformField::generate(&config, &mut rng);
        for platform in &mut field.platforms {
            platform.bounds.y = 10_000.0;
        }
        let sensors = SensorArray::new(&config);

        let mut agent = Agent::spawn(&config);
        agent.apply_decision(Action::Right, &config);
        agent.integrate(&config);
        let reading = sensors.sense(&agent, &field);
        assert!((reading[NUM_PROBES] - 1.0).abs() < f32::EPSILON);
        assert!((reading[NUM_PROBES + 1] - 1.0).abs() < f32::EPSILON);

        agent.jump(&config);
        agent.apply_decision(Action::Left, &config);
        agent.integrate(&config);
        let reading = sensors.sense(&agent, &field);
        assert!((reading[NUM_PROBES] - -1.0).abs() < f32::EPSILON);
        assert!((reading[NUM_PROBES + 1] - -1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn insert_allocates_unique_handles() {
        let config = test_config();
        let mut population = Population::new();
        let a = population.insert(Agent::spawn(&config));
        let b = population.insert(Agent::spawn(&config));
        assert_ne!(a, b);
        assert_eq!(population.len(), 2);
        assert!(population.contains(a));
        assert!(population.contains(b));
    }

    #[test]
    fn remove_keeps_dense_storage_coherent() {
        let config = test_config();
        let mut population = Population::new();
        let a = population.insert(Agent::spawn(&config));
        let b = population.insert(Agent::spawn(&config));
        let c = population.insert(Agent::spawn(&config));

        population.remove(b).expect("agent removed");
        assert_eq!(population.len(), 2);
        assert!(population.contains(a));
        assert!(population.contains(c));
        assert!(!population.contains(b));

        let d = population.insert(Agent::spawn(&config));
        assert_ne!(
            b, d,
            "generational handles should not be reused immediately"
        );
    }

    #[test]
    fn remove_many_preserves_population_order() {
        let config = test_config();
        let mut population = Population::new();
        let ids: Vec<AgentId> = (0..6)
            .map(|offset| {
                let mut agent = Agent::spawn(&config);
                agent.position.x = offset as f32;
                population.insert(agent)
            })
            .collect();

        let dead: HashSet<AgentId> = [ids[1], ids[4]].into_iter().collect();
        let removed = population.remove_many(&dead);
        assert_eq!(removed, 2);

        let survivors: Vec<AgentId> = population.iter_handles().collect();
        assert_eq!(survivors, vec![ids[0], ids[2], ids[3], ids[5]]);
        let xs: Vec<f32> = population.agents().iter().map(|a| a.position.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0, 5.0]);
    }
}
