//! Train controller
//!
//! Owns the member locomotives and the synchronization table built from
//! their curves. All behavior is driven by four kinds of input: operator
//! calls (activate, target speed, direction, emergency stop), member
//! change events, and the two timers it schedules for itself.

use core::cmp::Ordering;

use heapless::Vec;

use super::ramp::{tick_interval_ms, RampOrigin, RampState};
use super::reconcile::should_delay;
use crate::config::TrainConfig;
use crate::scheduler::TimerQueue;
use crate::speed::{SpeedMapping, SpeedPoint, SyncTable, TableIndex, MAX_MEMBERS, NULL_TABLE_ENTRY};
use crate::traits::{
    Address, Direction, ListenerId, Locomotive, Scheduler, Step, TimerKind, TimerToken,
    EMERGENCY_STOP,
};

/// Errors from membership changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemberError {
    /// Membership is frozen while the train is active
    Active,
    /// The train already has `MAX_MEMBERS` locomotives
    Full,
    /// A locomotive with this address is already a member
    Duplicate,
}

/// One locomotive in the train
#[derive(Debug)]
pub struct MemberItem<L> {
    loco: L,
    /// Locomotive faces against the train direction
    invert_direction: bool,
    /// Step of the last command this controller sent
    last_commanded_step: Step,
}

impl<L: Locomotive> MemberItem<L> {
    fn new(loco: L, invert_direction: bool) -> Self {
        Self {
            loco,
            invert_direction,
            last_commanded_step: 0,
        }
    }

    /// Get the locomotive handle
    pub fn loco(&self) -> &L {
        &self.loco
    }

    /// Check if the locomotive runs inverted
    pub fn invert_direction(&self) -> bool {
        self.invert_direction
    }

    /// Step of the last command sent by the train
    pub fn last_commanded_step(&self) -> Step {
        self.last_commanded_step
    }

    fn command(&mut self, step: Step, direction: Direction) {
        self.loco.drive(step, direction);
        self.last_commanded_step = step;
    }
}

/// Pending hold-off for one member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DelayedApply {
    member: usize,
    token: TimerToken,
}

/// Multi-heading train controller
///
/// `L` is the locomotive handle type, `S` the timer service. Table index
/// is the unit of speed: every command sent to the members is a row of
/// the synchronization table, except for the emergency stop and for the
/// clamping of a member pushed past the speed cap.
pub struct TrainController<L, S> {
    /// Identity used when subscribing to member events
    listener: ListenerId,
    scheduler: S,
    config: TrainConfig,

    members: Vec<MemberItem<L>, MAX_MEMBERS>,
    table: SyncTable,

    active: bool,
    direction: Direction,

    /// Requested position
    target: SpeedPoint,
    /// Position last applied to the members
    last_set: SpeedPoint,
    /// Highest allowed position
    max_speed: SpeedPoint,
    /// User-requested cap, `None` for the fastest entry
    max_speed_limit: Option<f64>,

    ramp: RampState,
    ramp_origin: RampOrigin,
    accel_timer: Option<TimerToken>,
    delayed: Option<DelayedApply>,
}

impl<L: Locomotive, S: Scheduler> TrainController<L, S> {
    /// Create an inactive train without members
    pub fn new(listener: ListenerId, scheduler: S, config: TrainConfig) -> Self {
        Self {
            listener,
            scheduler,
            config,
            members: Vec::new(),
            table: SyncTable::new(),
            active: false,
            direction: Direction::Forward,
            target: SpeedPoint::NULL,
            last_set: SpeedPoint::NULL,
            max_speed: SpeedPoint::NULL,
            max_speed_limit: None,
            ramp: RampState::Idle,
            ramp_origin: RampOrigin::default(),
            accel_timer: None,
            delayed: None,
        }
    }

    // Accessors

    /// Check if the train is driving its members
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Get the train direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Get the ramp state
    pub fn ramp_state(&self) -> RampState {
        self.ramp
    }

    /// Get the requested position
    pub fn target_speed(&self) -> SpeedPoint {
        self.target
    }

    /// Get the committed position
    pub fn last_set_speed(&self) -> SpeedPoint {
        self.last_set
    }

    /// Get the speed cap
    pub fn max_speed(&self) -> SpeedPoint {
        self.max_speed
    }

    /// Get the synchronization table
    pub fn table(&self) -> &SyncTable {
        &self.table
    }

    /// Get the members in table order
    pub fn members(&self) -> &[MemberItem<L>] {
        &self.members
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Get a member's handle for feeding it events
    pub fn loco_mut(&mut self, address: Address) -> Option<&mut L> {
        let idx = self.member_index(address)?;
        Some(&mut self.members[idx].loco)
    }

    /// Get the timer service
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Get the timer service mutably
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Get the active configuration
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    // Membership

    /// Couple a locomotive to the train
    ///
    /// The table is discarded and rebuilt on the next activation.
    pub fn add_member(&mut self, mut loco: L, invert_direction: bool) -> Result<(), MemberError> {
        if self.active {
            return Err(MemberError::Active);
        }
        let address = loco.address();
        if self.member_index(address).is_some() {
            return Err(MemberError::Duplicate);
        }
        if self.members.is_full() {
            return Err(MemberError::Full);
        }

        loco.subscribe(self.listener);
        self.members
            .push(MemberItem::new(loco, invert_direction))
            .map_err(|_| MemberError::Full)?;
        self.invalidate_table();

        info!("Member {} added (invert: {})", address, invert_direction);
        Ok(())
    }

    /// Uncouple a locomotive and hand it back
    ///
    /// Returns `None` if the train is active or `address` is not a member.
    pub fn remove_member(&mut self, address: Address) -> Option<L> {
        if self.active {
            warn!("Cannot remove member {} from an active train", address);
            return None;
        }
        let idx = self.member_index(address)?;

        let mut item = self.members.remove(idx);
        item.loco.unsubscribe(self.listener);
        self.invalidate_table();

        info!("Member {} removed", address);
        Some(item.loco)
    }

    /// Change how a member faces within the train
    ///
    /// Only allowed while inactive.
    pub fn set_member_invert(&mut self, address: Address, invert_direction: bool) -> bool {
        if self.active {
            return false;
        }
        match self.member_index(address) {
            Some(idx) => {
                self.members[idx].invert_direction = invert_direction;
                true
            }
            None => false,
        }
    }

    /// Rebuild the synchronization table from the members' curves
    ///
    /// Refused while active, the table must not change under a moving train.
    pub fn rebuild_table(&mut self) -> bool {
        if self.active {
            warn!("Table rebuild refused while active");
            return false;
        }
        self.rebuild();
        true
    }

    // Activation

    /// Take control of the members, or release them
    ///
    /// Activation rebuilds the table, stops every member and re-asserts
    /// the train direction. Deactivation is refused unless the committed
    /// position is stopped.
    pub fn set_active(&mut self, active: bool) -> bool {
        if active == self.active {
            return true;
        }

        if active {
            self.rebuild();
            self.active = true;
            self.emergency_stop();
            self.assert_direction();
            info!(
                "Train active: {} members, {} table entries",
                self.members.len(),
                self.table.len()
            );
            return true;
        }

        if !self.last_set.is_null() {
            warn!(
                "Refusing to deactivate a moving train (index {})",
                self.last_set.table_index
            );
            return false;
        }

        self.cancel_accel_timer();
        self.cancel_delayed();
        self.ramp = RampState::Idle;
        self.target = SpeedPoint::NULL;
        self.active = false;
        info!("Train inactive");
        true
    }

    // Operator commands

    /// Stop every member at once
    ///
    /// Bypasses the ramp and any pending hold-off.
    pub fn emergency_stop(&mut self) {
        let direction = self.direction;
        for member in self.members.iter_mut() {
            member.command(EMERGENCY_STOP, direction.resolve(member.invert_direction));
        }

        self.cancel_accel_timer();
        self.cancel_delayed();
        self.ramp = RampState::Idle;
        self.last_set = SpeedPoint::NULL;
        self.target = SpeedPoint::NULL;

        info!("Emergency stop");
    }

    /// Set the train direction
    ///
    /// Only members whose reported direction differs are commanded. They
    /// keep their last commanded step.
    pub fn set_direction(&mut self, direction: Direction) {
        if direction != self.direction {
            debug!("Direction {} -> {}", self.direction, direction);
        }
        self.direction = direction;
        if self.active {
            self.assert_direction();
        }
    }

    /// Request a new train speed
    ///
    /// `index` is clamped to the speed cap. With `source` set, that
    /// member is left alone for the hold-off delay: its throttle is where
    /// the request came from. The ramp starts, reverses or stops as needed.
    pub fn set_target_speed(&mut self, speed: f64, index: TableIndex, source: Option<usize>) {
        if !self.can_drive() {
            return;
        }
        if source.is_some_and(|member| member >= self.members.len()) {
            debug!("Target from unknown member ignored");
            return;
        }

        let last = self.table.last_index();
        let mut target = if (NULL_TABLE_ENTRY..=last).contains(&index) {
            SpeedPoint::new(speed, index)
        } else {
            self.table.point_at(index.clamp(NULL_TABLE_ENTRY, last))
        };
        if target.table_index > self.max_speed.table_index {
            target = self.max_speed;
        }
        self.target = target;
        debug!("Target index {} speed {}", target.table_index, target.speed);

        if let Some(member) = source {
            self.start_delayed_apply(member);
        }

        let committed = self.last_set.table_index;
        match target.table_index.cmp(&committed) {
            Ordering::Greater => {
                if self.ramp != RampState::Accelerating {
                    let baseline = self.current_speed();
                    self.start_ramp(RampState::Accelerating, baseline);
                }
            }
            Ordering::Less => {
                if self.ramp != RampState::Braking {
                    let baseline = self.current_speed();
                    self.start_ramp(RampState::Braking, baseline);
                }
            }
            Ordering::Equal => {
                if self.ramp.is_ramping() {
                    self.cancel_accel_timer();
                    self.ramp = RampState::Idle;
                    self.apply_entry(committed, true);
                }
            }
        }
    }

    /// Limit the train to `speed`
    ///
    /// The cap snaps down to the fastest entry not faster than `speed`. A
    /// target above the new cap is lowered to it.
    pub fn set_max_speed(&mut self, speed: f64) {
        self.max_speed_limit = Some(speed);
        self.max_speed = self.cap_for(self.max_speed_limit);
        info!(
            "Speed cap: index {} speed {}",
            self.max_speed.table_index, self.max_speed.speed
        );

        if self.target.table_index > self.max_speed.table_index {
            let cap = self.max_speed;
            self.set_target_speed(cap.speed, cap.table_index, None);
        }
    }

    /// Remove the speed cap
    pub fn clear_max_speed(&mut self) {
        self.max_speed_limit = None;
        self.max_speed = self.cap_for(None);
    }

    // Events

    /// Handle a change reported by member `address`
    ///
    /// Echoes of the train's own commands are ignored, as is everything
    /// while inactive.
    pub fn on_member_changed(&mut self, address: Address, is_echo: bool) {
        if !self.active || is_echo {
            return;
        }
        let Some(idx) = self.member_index(address) else {
            return;
        };

        let member = &self.members[idx];
        let step = member.loco.reported_step();
        let last = member.last_commanded_step;
        let train_direction = member.loco.reported_direction().resolve(member.invert_direction);

        if train_direction != self.direction {
            debug!("Member {} changed train direction", address);
            self.set_direction(train_direction);
        }

        if step == last {
            return;
        }

        if step == EMERGENCY_STOP {
            warn!("Member {} requested emergency stop", address);
            self.emergency_stop();
            return;
        }

        self.reconcile(idx, step);
    }

    /// Handle a fired timer
    ///
    /// Tokens that were cancelled or superseded are ignored.
    pub fn on_timer(&mut self, token: TimerToken, kind: TimerKind) {
        match kind {
            TimerKind::AccelerationTick => {
                if self.accel_timer == Some(token) {
                    self.accel_timer = None;
                    self.on_acceleration_tick();
                } else {
                    trace!("Stale ramp tick {}", token.0);
                }
            }
            TimerKind::DelayedApply { member } => match self.delayed {
                Some(pending) if pending.token == token && pending.member == member => {
                    self.delayed = None;
                    debug!("Hold-off over for member {}", member);
                    self.commit_member(member);
                }
                _ => trace!("Stale hold-off {}", token.0),
            },
        }
    }

    // Internals

    fn member_index(&self, address: Address) -> Option<usize> {
        self.members.iter().position(|m| m.loco.address() == address)
    }

    fn can_drive(&self) -> bool {
        self.active && self.members.len() >= 2 && !self.table.is_empty()
    }

    fn invalidate_table(&mut self) {
        self.table = SyncTable::new();
        self.max_speed = SpeedPoint::NULL;
    }

    fn rebuild(&mut self) {
        let mut mappings: Vec<&SpeedMapping, MAX_MEMBERS> = Vec::new();
        for member in self.members.iter() {
            let _ = mappings.push(member.loco.speed_mapping());
        }
        self.table = SyncTable::build(&mappings, self.config.sync.tolerance);
        self.max_speed = self.cap_for(self.max_speed_limit);
    }

    fn cap_for(&self, limit: Option<f64>) -> SpeedPoint {
        match limit {
            Some(speed) => {
                let (index, entry) = self.table.closest_match_speed(speed);
                SpeedPoint::new(entry.avg_speed(), index)
            }
            None => self.table.point_at(self.table.last_index()),
        }
    }

    fn rate_for(&self, ramp: RampState) -> f64 {
        match ramp {
            RampState::Braking => self.config.ramp.deceleration,
            _ => self.config.ramp.acceleration,
        }
    }

    /// Estimated speed of the train right now
    ///
    /// Mid-ramp this is extrapolated from where the pending tick started,
    /// so reversing a ramp does not jump.
    fn current_speed(&self) -> f64 {
        if !self.ramp.is_ramping() {
            return self.last_set.speed;
        }
        let next = self
            .table
            .point_at(self.last_set.table_index + self.ramp.index_step());
        self.ramp_origin
            .speed_at(self.scheduler.now_ms(), self.rate_for(self.ramp), next.speed)
    }

    fn start_ramp(&mut self, ramp: RampState, baseline: f64) {
        self.cancel_accel_timer();
        self.ramp = ramp;
        self.schedule_tick(baseline);
    }

    fn schedule_tick(&mut self, baseline: f64) {
        let next = self
            .table
            .point_at(self.last_set.table_index + self.ramp.index_step());
        let delay_ms = tick_interval_ms(next.speed - baseline, self.rate_for(self.ramp));

        self.ramp_origin = RampOrigin {
            started_ms: self.scheduler.now_ms(),
            speed: baseline,
        };

        match self.scheduler.schedule_after(delay_ms, TimerKind::AccelerationTick) {
            Ok(token) => {
                trace!("Ramp tick to index {} in {} ms", next.table_index, delay_ms);
                self.accel_timer = Some(token);
            }
            Err(e) => {
                warn!("Cannot schedule ramp tick: {}", e);
                self.ramp = RampState::Idle;
            }
        }
    }

    fn on_acceleration_tick(&mut self) {
        let step = self.ramp.index_step();
        if step == 0 {
            return;
        }

        let next = self.last_set.table_index + step;
        if next < NULL_TABLE_ENTRY || next > self.table.last_index() {
            self.ramp = RampState::Idle;
            return;
        }

        self.last_set = self.table.point_at(next);
        self.apply_entry(next, false);
        trace!("Ramp at index {} speed {}", next, self.last_set.speed);

        match self.target.table_index.cmp(&next) {
            Ordering::Greater => {
                self.ramp = RampState::Accelerating;
                self.schedule_tick(self.last_set.speed);
            }
            Ordering::Less => {
                self.ramp = RampState::Braking;
                self.schedule_tick(self.last_set.speed);
            }
            Ordering::Equal => {
                self.ramp = RampState::Idle;
                debug!("Target index {} reached", next);
            }
        }
    }

    /// Command every member to the entry at `index`
    ///
    /// A member in hold-off is skipped. Without `force`, members already
    /// at the right step and direction are not re-commanded.
    fn apply_entry(&mut self, index: TableIndex, force: bool) {
        let skip = self.delayed.map(|d| d.member);
        let direction = self.direction;
        let entry = self.table.entry_at(index);

        for (i, member) in self.members.iter_mut().enumerate() {
            if Some(i) == skip {
                continue;
            }
            let step = entry.step_for(i);
            let member_direction = direction.resolve(member.invert_direction);
            if force
                || member.last_commanded_step != step
                || member.loco.last_commanded_direction() != member_direction
            {
                member.command(step, member_direction);
            }
        }
    }

    /// Command one member to its step in the committed entry
    fn commit_member(&mut self, member: usize) {
        let step = self.table.entry_at(self.last_set.table_index).step_for(member);
        let direction = self.direction;
        if let Some(item) = self.members.get_mut(member) {
            item.command(step, direction.resolve(item.invert_direction));
        }
    }

    fn assert_direction(&mut self) {
        let direction = self.direction;
        for member in self.members.iter_mut() {
            let wanted = direction.resolve(member.invert_direction);
            if member.loco.reported_direction() != wanted {
                let step = member.last_commanded_step;
                member.command(step, wanted);
            }
        }
    }

    /// Follow a manual step change on member `idx`
    fn reconcile(&mut self, idx: usize, step: Step) {
        if !self.can_drive() {
            return;
        }

        let cap_step = self.table.entry_at(self.max_speed.table_index).step_for(idx);
        if step > cap_step {
            debug!("Member {} step {} above cap {}", idx, step, cap_step);
            let direction = self.direction;
            let member = &mut self.members[idx];
            member.command(cap_step, direction.resolve(member.invert_direction));
            let cap = self.max_speed;
            self.set_target_speed(cap.speed, cap.table_index, None);
            return;
        }

        let (index, entry) = self.table.closest_match(idx, step);
        let matched = entry.step_for(idx);
        let speed = entry.avg_speed();

        let delay = matched != step
            && should_delay(
                &self.config.reconcile,
                self.members[idx].last_commanded_step,
                step,
                matched,
                index,
                self.last_set.table_index,
            );
        debug!(
            "Member {} step {} -> index {} (step {}), delay: {}",
            idx, step, index, matched, delay
        );

        if delay {
            self.set_target_speed(speed, index, Some(idx));
        } else {
            if self.delayed.map(|d| d.member) == Some(idx) {
                self.cancel_delayed();
            }
            self.apply_entry(self.last_set.table_index, true);
            self.set_target_speed(speed, index, None);
        }
    }

    fn start_delayed_apply(&mut self, member: usize) {
        if let Some(pending) = self.delayed.take() {
            self.scheduler.cancel(pending.token);
            if pending.member != member {
                debug!("Flushing hold-off of member {}", pending.member);
                self.commit_member(pending.member);
            }
        }

        let kind = TimerKind::DelayedApply { member };
        match self.scheduler.schedule_after(self.config.reconcile.delay_ms, kind) {
            Ok(token) => self.delayed = Some(DelayedApply { member, token }),
            Err(e) => {
                warn!("Cannot schedule hold-off: {}", e);
                self.commit_member(member);
            }
        }
    }

    fn cancel_accel_timer(&mut self) {
        if let Some(token) = self.accel_timer.take() {
            self.scheduler.cancel(token);
        }
    }

    fn cancel_delayed(&mut self) {
        if let Some(pending) = self.delayed.take() {
            self.scheduler.cancel(pending.token);
        }
    }
}

impl<L: Locomotive> TrainController<L, TimerQueue> {
    /// Fire every timer due up to `until_ms`, then move the clock there
    ///
    /// Returns the number of timers fired.
    pub fn run_until(&mut self, until_ms: u64) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.scheduler.pop_due(until_ms) {
            self.on_timer(timer.token, timer.kind);
            fired += 1;
        }
        self.scheduler.advance_to(until_ms);
        fired
    }
}
