//! Turn-by-turn navigation state machine.
//!
//! A [`Navigator`] owns one [`NavigationState`] and drives it through
//! `idle -> calculating -> navigating <-> off_route -> arrived -> idle`.
//!
//! Every mutation goes through `Inner::apply`, which holds the state
//! lock while the transition runs and collects side effects (events,
//! snapshots, recalculation requests) in an [`Outbox`]. The outbox is
//! queued before the lock is released and delivered by a single flusher
//! afterwards, so handlers and subscribers see transitions in the order
//! they were applied. Position samples, the periodic progress check and
//! recalculation results are the three writers, and all of them are
//! serialized this way.
//!
//! Sessions and recalculations carry generation numbers. A response
//! whose generation is no longer current (the session was stopped or
//! replaced, or a newer recalculation was issued) is dropped.

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::config::NavigatorConfig;
use crate::directions::{DirectionsClient, RouteProvider};
use crate::error::{NavError, Result};
use crate::events::{EventBus, EventHandler, NavigationEvent, Subscription};
use crate::geo::{distance_meters, Coordinate};
use crate::location::{LocationSource, PositionTracker, WatchOptions};
use crate::model::{Destination, PositionFix, Route, TravelMode};
use crate::state::{compute_progress, NavigationState, NavigationStatus, Progress};

/// Tolerance when deciding whether progress changed.
const PROGRESS_EPSILON: f64 = 1e-9;

/// Navigation engine. One instance per navigation surface; there is no
/// process-wide singleton.
pub struct Navigator {
    inner: Arc<Inner>,
}

struct Inner {
    config: NavigatorConfig,
    provider: Arc<dyn RouteProvider>,
    tracker: PositionTracker,
    bus: EventBus,
    session: Mutex<Session>,
    delivery: Mutex<Delivery>,
}

/// Outboxes waiting to be delivered, oldest first.
#[derive(Default)]
struct Delivery {
    queue: VecDeque<Outbox>,
    flushing: bool,
}

/// Releases the flusher role if a callback panics mid-flush.
struct FlushGuard<'a> {
    inner: &'a Inner,
    done: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.inner.deliveries().flushing = false;
        }
    }
}

#[derive(Default)]
struct Session {
    state: NavigationState,
    /// Bumped on every start and every teardown.
    id: u64,
    handler: Option<EventHandler>,
    ticker: Option<JoinHandle<()>>,
    recalc_in_flight: bool,
    recalc_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct RecalcRequest {
    session_id: u64,
    seq: u64,
    origin: Coordinate,
    destination: Coordinate,
    mode: TravelMode,
}

/// Side effects of one transition, performed after the lock is released.
#[derive(Default)]
struct Outbox {
    handler: Option<EventHandler>,
    events: Vec<NavigationEvent>,
    snapshots: Vec<NavigationState>,
    recalculation: Option<RecalcRequest>,
}

impl Outbox {
    fn emit(&mut self, event: NavigationEvent) {
        self.events.push(event);
    }

    fn mark(&mut self, state: &NavigationState) {
        self.snapshots.push(state.clone());
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.snapshots.is_empty()
    }
}

fn transition(state: &mut NavigationState, out: &mut Outbox, to: NavigationStatus) {
    let from = state.status;
    if from == to {
        return;
    }
    state.status = to;
    info!("Navigation status {:?} -> {:?}", from, to);
    out.emit(NavigationEvent::StatusChanged { from, to });
}

fn progress_changed(state: &NavigationState, progress: &Progress) -> bool {
    (state.distance_remaining - progress.distance_remaining).abs() > PROGRESS_EPSILON
        || (state.time_remaining - progress.time_remaining).abs() > PROGRESS_EPSILON
        || (state.route_progress - progress.route_progress).abs() > PROGRESS_EPSILON
}

fn distance_event(state: &NavigationState) -> NavigationEvent {
    NavigationEvent::DistanceUpdated {
        distance_remaining: state.distance_remaining,
        time_remaining: state.time_remaining,
        route_progress: state.route_progress,
    }
}

/// Events announcing a freshly installed route.
fn announce_route(state: &NavigationState, out: &mut Outbox) {
    if let Some(route) = &state.current_route {
        out.emit(NavigationEvent::RouteUpdated { route: route.clone() });
    }
    if let Some(step) = &state.current_step {
        out.emit(NavigationEvent::StepChanged {
            index: state.step_index,
            step: step.clone(),
        });
    }
    out.emit(distance_event(state));
}

impl Navigator {
    pub fn new(
        config: NavigatorConfig,
        provider: Arc<dyn RouteProvider>,
        location: Arc<dyn LocationSource>,
    ) -> Self {
        let options = WatchOptions {
            min_interval: config.tracking.min_interval(),
            min_distance_m: config.tracking.min_distance_m,
        };
        let inner = Inner {
            tracker: PositionTracker::new(location, options),
            provider,
            bus: EventBus::new(),
            session: Mutex::new(Session::default()),
            delivery: Mutex::new(Delivery::default()),
            config,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Navigator backed by the HTTP directions client from `config`.
    pub fn with_directions(
        config: NavigatorConfig,
        location: Arc<dyn LocationSource>,
    ) -> Result<Self> {
        let client = DirectionsClient::new(config.directions.clone())?;
        Ok(Self::new(config, Arc::new(client), location))
    }

    /// Start navigating to `destination`, replacing any running session.
    ///
    /// Returns false when no fix or no route could be obtained, or when
    /// the session was superseded before the route arrived. The status
    /// is back at idle in every failure case.
    pub async fn start_navigation(
        &self,
        destination: Destination,
        mode: TravelMode,
        handler: Option<EventHandler>,
    ) -> bool {
        match self.inner.start(destination, mode, handler).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Navigation start failed: {e}");
                false
            }
        }
    }

    /// Tear down the session. Synchronous and idempotent.
    ///
    /// The state is idle when this returns. If another thread is in the
    /// middle of delivering earlier events, the idle notification follows
    /// them.
    pub fn stop_navigation(&self) {
        self.inner.stop();
    }

    /// Unconditional teardown requested by the app (e.g. on logout).
    pub fn force_stop_navigation(&self) {
        info!("Forced navigation stop");
        self.inner.stop();
    }

    pub fn get_navigation_state(&self) -> NavigationState {
        self.inner.lock().state.clone()
    }

    /// Receive a snapshot after every state mutation.
    pub fn subscribe_to_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NavigationState) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(callback)
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.inner.config
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        // State is consistent between transitions, so a poisoned lock is usable
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliveries(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The single entry point for state mutation.
    ///
    /// The outbox is queued while the state lock is still held, so
    /// consumers see transitions in the order they were applied.
    fn apply<F, R>(self: &Arc<Self>, f: F) -> R
    where
        F: FnOnce(&Arc<Self>, &mut Session, &mut Outbox) -> R,
    {
        let mut out = Outbox::default();
        let (result, recalculation) = {
            let mut session = self.lock();
            let handler = session.handler.clone();
            let result = f(self, &mut session, &mut out);
            out.handler = handler.or_else(|| session.handler.clone());
            let recalculation = out.recalculation.take();
            if !out.is_empty() {
                self.deliveries().queue.push_back(out);
            }
            (result, recalculation)
        };

        // Spawned by the writer itself, which always runs on the runtime
        if let Some(request) = recalculation {
            self.spawn_recalculation(request);
        }
        self.flush();
        result
    }

    /// Deliver queued outboxes in order. Only one thread flushes at a
    /// time; anyone arriving while a flush runs (including callbacks
    /// calling back into the navigator) leaves their outbox to it.
    fn flush(&self) {
        {
            let mut delivery = self.deliveries();
            if delivery.flushing {
                return;
            }
            delivery.flushing = true;
        }

        let mut guard = FlushGuard { inner: self, done: false };
        loop {
            let next = {
                let mut delivery = self.deliveries();
                match delivery.queue.pop_front() {
                    Some(out) => out,
                    None => {
                        delivery.flushing = false;
                        guard.done = true;
                        return;
                    }
                }
            };
            self.deliver(next);
        }
    }

    fn deliver(&self, out: Outbox) {
        if let Some(handler) = &out.handler {
            for event in &out.events {
                handler.emit(event);
            }
        }
        for snapshot in &out.snapshots {
            self.bus.publish(snapshot);
        }
    }

    async fn start(
        self: &Arc<Self>,
        destination: Destination,
        mode: TravelMode,
        handler: Option<EventHandler>,
    ) -> Result<()> {
        self.stop();

        if !destination.coordinates.is_valid() {
            return Err(NavError::InvalidDestination(format!(
                "{} has coordinates {},{}",
                destination.id, destination.coordinates.lat, destination.coordinates.lng
            )));
        }

        let target = destination.coordinates;
        info!("Starting {} navigation to {}", mode.as_provider_str(), destination.name);

        let session_id = self.apply(|_, s, out| {
            s.id += 1;
            s.handler = handler;
            s.state.destination = Some(destination);
            s.state.travel_mode = mode;
            transition(&mut s.state, out, NavigationStatus::Calculating);
            out.mark(&s.state);
            s.id
        });

        let result = self.calculate_initial(session_id, target, mode).await;
        if result.is_err() {
            self.abandon(session_id);
        }
        result
    }

    async fn calculate_initial(
        self: &Arc<Self>,
        session_id: u64,
        target: Coordinate,
        mode: TravelMode,
    ) -> Result<()> {
        let fix = self
            .tracker
            .get_once(self.config.tracking.fix_timeout())
            .await?;

        let route = self
            .provider
            .calculate_route(fix.coordinate(), target, mode)
            .await
            .map_err(|e| match e {
                NavError::InvalidDestination(_) => e,
                other => NavError::RouteComputationFailed(other.to_string()),
            })?
            .ok_or_else(|| NavError::RouteComputationFailed("no route found".into()))?;

        self.apply(|inner, s, out| {
            if s.id != session_id {
                return Err(NavError::RouteComputationFailed(
                    "session superseded while calculating".into(),
                ));
            }

            info!(
                "Route installed: {} steps, {:.0} m",
                route.steps().len(),
                route.total_distance_m()
            );
            s.state.user_location = Some(fix);
            s.state.install_route(route);
            transition(&mut s.state, out, NavigationStatus::Navigating);
            announce_route(&s.state, out);
            out.mark(&s.state);

            inner.begin_tracking(s, session_id)
        })
    }

    /// Start the position subscription and the periodic progress check.
    fn begin_tracking(self: &Arc<Self>, s: &mut Session, session_id: u64) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.tracker.start(move |fix| {
            if let Some(inner) = weak.upgrade() {
                inner.on_position(session_id, fix);
            }
        })?;

        let weak = Arc::downgrade(self);
        let period = self.config.tracking.progress_check_interval();
        if let Some(stale) = s.ticker.replace(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            // Skip the first immediate tick
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.on_tick(session_id);
            }
        })) {
            stale.abort();
        }
        Ok(())
    }

    /// Revert a failed start, unless a newer session took over.
    fn abandon(self: &Arc<Self>, session_id: u64) {
        self.apply(|inner, s, out| {
            if s.id == session_id {
                inner.teardown(s, out);
            }
        });
    }

    fn stop(self: &Arc<Self>) {
        self.apply(|inner, s, out| inner.teardown(s, out));
    }

    fn teardown(&self, s: &mut Session, out: &mut Outbox) {
        self.tracker.stop();
        if let Some(ticker) = s.ticker.take() {
            ticker.abort();
        }
        s.id += 1;
        s.recalc_in_flight = false;
        s.handler = None;

        let from = s.state.status;
        let was_reset = s.state == NavigationState::default();
        s.state = NavigationState::default();

        if from != NavigationStatus::Idle {
            info!("Navigation status {:?} -> {:?}", from, NavigationStatus::Idle);
            out.emit(NavigationEvent::StatusChanged {
                from,
                to: NavigationStatus::Idle,
            });
        }
        if !was_reset {
            out.mark(&s.state);
        }
    }

    fn on_position(self: &Arc<Self>, session_id: u64, fix: PositionFix) {
        self.apply(|inner, s, out| {
            if s.id != session_id || !s.state.is_active() {
                return;
            }
            inner.process_sample(s, fix, out);
        });
    }

    fn process_sample(&self, s: &mut Session, fix: PositionFix, out: &mut Outbox) {
        let t = &self.config.thresholds;
        let position = fix.coordinate();
        s.state.user_location = Some(fix);

        let Some(target) = s.state.destination.as_ref().map(|d| d.coordinates) else {
            return;
        };

        // Arrival is checked first and independently of the steps
        if distance_meters(&position, &target) < t.arrival_m {
            self.arrive(s, out);
            return;
        }

        let Some(route) = s.state.current_route.as_ref() else {
            out.mark(&s.state);
            return;
        };
        let steps = route.steps();
        if steps.is_empty() {
            out.mark(&s.state);
            return;
        }

        // At most one step per sample
        let mut index = s.state.step_index.min(steps.len() - 1);
        let mut advanced = None;
        if index + 1 < steps.len()
            && distance_meters(&position, &steps[index].end_location) < t.step_advance_m
        {
            index += 1;
            advanced = Some(steps[index].clone());
        }

        let step = &steps[index];
        let off_route = distance_meters(&position, &step.start_location) > t.off_route_m
            && distance_meters(&position, &step.end_location) > t.off_route_m;
        let progress = compute_progress(route, index);

        if let Some(step) = advanced {
            debug!("Advanced to step {index}: {}", step.instruction);
            s.state.step_index = index;
            s.state.current_step = Some(step.clone());
            out.emit(NavigationEvent::StepChanged { index, step });
        }

        if off_route && !s.state.is_off_route {
            info!(
                "Off route at {:.6},{:.6}, requesting recalculation",
                position.lat, position.lng
            );
            s.state.is_off_route = true;
            transition(&mut s.state, out, NavigationStatus::OffRoute);
            out.emit(NavigationEvent::OffRoute { off_route: true });
            Self::request_recalculation(s, position, target, out);
        } else if !off_route && s.state.is_off_route {
            debug!("Back on route");
            s.state.is_off_route = false;
            transition(&mut s.state, out, NavigationStatus::Navigating);
            out.emit(NavigationEvent::OffRoute { off_route: false });
        }

        if progress_changed(&s.state, &progress) {
            s.state.apply_progress(progress);
            out.emit(distance_event(&s.state));
        }
        out.mark(&s.state);
    }

    fn arrive(&self, s: &mut Session, out: &mut Outbox) {
        transition(&mut s.state, out, NavigationStatus::Arrived);
        s.state.distance_remaining = 0.0;
        s.state.time_remaining = 0.0;
        s.state.route_progress = 1.0;

        if let Some(destination) = s.state.destination.clone() {
            info!("Arrived at {}", destination.name);
            out.emit(NavigationEvent::Arrived { destination });
        }
        out.mark(&s.state);

        self.teardown(s, out);
    }

    fn request_recalculation(
        s: &mut Session,
        origin: Coordinate,
        destination: Coordinate,
        out: &mut Outbox,
    ) {
        if s.recalc_in_flight {
            debug!("Recalculation already in flight");
            return;
        }
        s.recalc_in_flight = true;
        s.recalc_seq += 1;
        out.recalculation = Some(RecalcRequest {
            session_id: s.id,
            seq: s.recalc_seq,
            origin,
            destination,
            mode: s.state.travel_mode,
        });
    }

    fn spawn_recalculation(self: &Arc<Self>, request: RecalcRequest) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner
                .provider
                .calculate_route(request.origin, request.destination, request.mode)
                .await;
            inner.finish_recalculation(request, result);
        });
    }

    fn finish_recalculation(
        self: &Arc<Self>,
        request: RecalcRequest,
        result: Result<Option<Route>>,
    ) {
        self.apply(|_, s, out| {
            if s.id != request.session_id || s.recalc_seq != request.seq {
                debug!("Discarding stale recalculation #{}", request.seq);
                return;
            }
            s.recalc_in_flight = false;

            let route = match result {
                Ok(Some(route)) => route,
                Ok(None) => {
                    warn!("{}", NavError::RecalculationFailed("no route found".into()));
                    return;
                }
                Err(e) => {
                    warn!("{}", NavError::RecalculationFailed(e.to_string()));
                    return;
                }
            };

            info!("Recalculated route: {} steps", route.steps().len());
            let was_off_route = s.state.is_off_route;
            s.state.install_route(route);
            transition(&mut s.state, out, NavigationStatus::Navigating);
            if was_off_route {
                out.emit(NavigationEvent::OffRoute { off_route: false });
            }
            announce_route(&s.state, out);
            out.mark(&s.state);
        });
    }

    /// Periodic backstop: recompute progress for the current step once a
    /// position is known.
    ///
    /// This is its only effect. Progress is step-granular, so the check
    /// changes state only when the stored figures differ from the step
    /// sums, e.g. right after a route whose leg totals disagree with its
    /// steps was installed. Arrival, step and off-route decisions are
    /// left to position samples.
    fn on_tick(self: &Arc<Self>, session_id: u64) {
        self.apply(|_, s, out| {
            if s.id != session_id || !s.state.is_active() || s.state.user_location.is_none() {
                return;
            }
            let Some(route) = s.state.current_route.as_ref() else {
                return;
            };
            let progress = compute_progress(route, s.state.step_index);
            if progress_changed(&s.state, &progress) {
                s.state.apply_progress(progress);
                out.emit(distance_event(&s.state));
                out.mark(&s.state);
            }
        });
    }
}
