//! Chart session
//!
//! Owns the state behind one chart view: the candle buffer, the indicator
//! preferences and the current (instrument, interval) selection. Every
//! write bumps a version; [`ChartSession::frame`] recomputes the derived
//! view (sanitized candles, volume bars, indicators, layout) only when a
//! version it was computed from has moved.
//!
//! Historical fetches are tagged with a generation. Only the fetch issued
//! for the current selection may seed the buffer; anything older is
//! discarded so a slow response cannot overwrite live ticks.
//!
//! [`run_chart_session`] drives a session from async sources: commands on
//! an mpsc channel, history through a [`CandleSource`], ticks through a
//! [`StreamRouter`] subscription, frames out through a `watch` channel.

use std::collections::BTreeMap;
use std::sync::{Arc, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use types::candle::{Candle, RawCandle};
use types::ids::InstrumentId;
use types::interval::Interval;

use crate::buffer::{BufferConfig, CandleStreamBuffer, MergeOutcome};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::indicators::{self, IndicatorKind, IndicatorResult};
use crate::layout::{self, PaneLayout};
use crate::preferences::{IndicatorPreferences, IndicatorSettings, PreferencesError};
use crate::sanitizer::{self, Rejection, VolumeBar};
use crate::source::{CandleSource, HistoryQuery, DEFAULT_HISTORY_LIMIT};
use crate::stream::{SharedStreamRouter, StreamRouter, Subscription};

/// Session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub buffer: BufferConfig,
    pub history_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl From<&FeedConfig> for SessionConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            buffer: config.buffer_config(),
            history_limit: config.history_limit,
        }
    }
}

/// Load state of the current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum SessionStatus {
    /// Nothing selected yet.
    #[default]
    Idle,
    /// History requested, not yet applied.
    Loading,
    Ready,
    /// Last history fetch failed; the previous buffer is kept.
    Error(String),
}

/// A historical fetch issued for a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub query: HistoryQuery,
}

/// What completing a fetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Buffer seeded with `len` candles.
    Seeded { len: usize },
    /// Superseded by a newer fetch; result discarded.
    Stale,
    /// Fetch failed; status set to error, buffer kept.
    Failed,
}

/// What happened to a live tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Merged(MergeOutcome),
    /// Malformed record, dropped.
    Dropped(Rejection),
    /// Tick for another instrument than the selection.
    OtherInstrument,
    NoSelection,
}

/// Derived view of the current selection, ready for rendering.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFrame {
    pub instrument: Option<InstrumentId>,
    pub interval: Interval,
    /// Sanitized candles; every other field derives from exactly these.
    pub candles: Vec<Candle>,
    pub volume: Vec<VolumeBar>,
    /// Enabled indicators only.
    pub indicators: BTreeMap<IndicatorKind, IndicatorResult>,
    pub layout: PaneLayout,
    pub warnings: Vec<String>,
    pub status: SessionStatus,
    /// Set after a seed until the renderer acknowledges its re-fit.
    pub needs_auto_fit: bool,
    /// Bumped each time the frame changes.
    pub revision: u64,
}

impl ChartFrame {
    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FrameStamp {
    selection: Option<(InstrumentId, Interval)>,
    buffer_version: u64,
    preferences_version: u64,
    status_version: u64,
}

/// State and derived view for one chart.
#[derive(Debug)]
pub struct ChartSession {
    buffer: CandleStreamBuffer,
    preferences: IndicatorPreferences,
    selection: Option<(InstrumentId, Interval)>,
    generation: u64,
    history_limit: u32,
    status: SessionStatus,
    status_version: u64,
    frame: ChartFrame,
    stamp: Option<FrameStamp>,
    recomputes: u64,
}

impl ChartSession {
    pub fn new(config: SessionConfig) -> Self {
        info!(
            max_candles = config.buffer.max_len,
            history_limit = config.history_limit,
            "Chart session created"
        );
        Self {
            buffer: CandleStreamBuffer::new(config.buffer),
            preferences: IndicatorPreferences::new(),
            selection: None,
            generation: 0,
            history_limit: config.history_limit,
            status: SessionStatus::Idle,
            status_version: 0,
            frame: ChartFrame::default(),
            stamp: None,
            recomputes: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    /// Start from previously loaded preferences.
    pub fn with_preferences(mut self, preferences: IndicatorPreferences) -> Self {
        self.preferences = preferences;
        self.stamp = None;
        self
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            self.status = status;
            self.status_version += 1;
        }
    }

    fn issue_ticket(&mut self, instrument: InstrumentId, interval: Interval) -> FetchTicket {
        self.generation += 1;
        self.set_status(SessionStatus::Loading);
        FetchTicket {
            generation: self.generation,
            query: HistoryQuery::new(instrument, interval).with_limit(self.history_limit),
        }
    }

    /// Change the selection. Returns the history fetch to issue for it.
    pub fn select(&mut self, instrument: InstrumentId, interval: Interval) -> FetchTicket {
        info!(instrument = %instrument, interval = %interval, "Chart selection changed");
        self.selection = Some((instrument.clone(), interval));
        self.issue_ticket(instrument, interval)
    }

    /// Re-fetch history for the current selection.
    pub fn begin_refresh(&mut self) -> Option<FetchTicket> {
        let (instrument, interval) = self.selection.clone()?;
        debug!(instrument = %instrument, interval = %interval, "Refreshing chart history");
        Some(self.issue_ticket(instrument, interval))
    }

    /// Apply the result of a historical fetch.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<RawCandle>, FeedError>,
    ) -> FetchOutcome {
        if ticket.generation != self.generation {
            warn!(
                instrument = %ticket.query.instrument,
                ticket = ticket.generation,
                current = self.generation,
                "Discarding stale history fetch"
            );
            return FetchOutcome::Stale;
        }

        let query = ticket.query;
        match result {
            Ok(raw) => {
                let candles = sanitizer::sanitize(&raw, query.interval, Utc::now().timestamp());
                let len = self.buffer.seed(&query.instrument, query.interval, candles);
                self.set_status(SessionStatus::Ready);
                FetchOutcome::Seeded { len }
            }
            Err(err) => {
                warn!(
                    instrument = %query.instrument,
                    interval = %query.interval,
                    error = %err,
                    kind = err.kind(),
                    "History fetch failed; keeping last good candles"
                );
                self.set_status(SessionStatus::Error(err.to_string()));
                FetchOutcome::Failed
            }
        }
    }

    /// Merge one live tick into the selected series.
    pub fn on_tick(&mut self, raw: &RawCandle) -> TickOutcome {
        let Some((instrument, interval)) = &self.selection else {
            return TickOutcome::NoSelection;
        };
        if raw.instrument_id.as_ref().is_some_and(|id| id != instrument) {
            return TickOutcome::OtherInstrument;
        }
        match sanitizer::normalize(raw, *interval, Utc::now().timestamp()) {
            Ok(candle) => TickOutcome::Merged(self.buffer.merge(instrument, *interval, candle)),
            Err(reason) => {
                debug!(?reason, instrument = %instrument, "Dropping malformed tick");
                TickOutcome::Dropped(reason)
            }
        }
    }

    /// Flip an indicator for the selected instrument.
    pub fn toggle_indicator(&mut self, kind: IndicatorKind) -> Option<bool> {
        let (instrument, _) = self.selection.as_ref()?;
        Some(self.preferences.toggle(instrument, kind))
    }

    pub fn set_indicator_enabled(&mut self, kind: IndicatorKind, enabled: bool) -> bool {
        match &self.selection {
            Some((instrument, _)) => {
                self.preferences.set_enabled(instrument, kind, enabled);
                true
            }
            None => false,
        }
    }

    /// Merge settings for an indicator of the selected instrument.
    ///
    /// `Ok(false)` when nothing is selected; invalid settings are rejected
    /// and leave the preferences untouched.
    pub fn update_settings(
        &mut self,
        kind: IndicatorKind,
        partial: &IndicatorSettings,
    ) -> Result<bool, PreferencesError> {
        match &self.selection {
            Some((instrument, _)) => {
                self.preferences.update_settings(instrument, kind, partial)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Renderer has re-fitted the view after a seed.
    ///
    /// Bumps the frame revision when the flag was set so subscribers see it
    /// clear.
    pub fn acknowledge_auto_fit(&mut self) {
        if let Some((instrument, interval)) = &self.selection {
            self.buffer.acknowledge_auto_fit(instrument, *interval);
        }
        if self.frame.needs_auto_fit {
            self.frame.needs_auto_fit = false;
            self.frame.revision += 1;
        }
    }

    fn current_stamp(&self) -> FrameStamp {
        let buffer_version = self
            .selection
            .as_ref()
            .map(|(instrument, interval)| self.buffer.version(instrument, *interval))
            .unwrap_or(0);
        FrameStamp {
            selection: self.selection.clone(),
            buffer_version,
            preferences_version: self.preferences.version(),
            status_version: self.status_version,
        }
    }

    /// Current derived view, recomputed only if its inputs changed.
    pub fn frame(&mut self) -> &ChartFrame {
        let stamp = self.current_stamp();
        if self.stamp.as_ref() != Some(&stamp) {
            self.recompute();
            self.stamp = Some(stamp);
        }
        &self.frame
    }

    fn recompute(&mut self) {
        let revision = self.frame.revision + 1;
        let mut frame = ChartFrame {
            status: self.status.clone(),
            revision,
            ..ChartFrame::default()
        };

        if let Some((instrument, interval)) = &self.selection {
            frame.instrument = Some(instrument.clone());
            frame.interval = *interval;

            if let Some(series) = self.buffer.series(instrument, *interval) {
                frame.candles = sanitizer::sanitize_candles(series.iter(), Utc::now().timestamp());
                frame.needs_auto_fit = series.needs_auto_fit();
            }
            frame.volume = sanitizer::volume_bars(&frame.candles);

            let settings = self.preferences.get(instrument);
            for kind in settings.enabled_kinds() {
                let result = indicators::compute(kind, settings.get(kind), &frame.candles);
                frame.warnings.extend(result.warnings.iter().cloned());
                frame.indicators.insert(kind, result);
            }
            frame.layout = layout::allocate(settings.active_oscillators());
        }

        self.recomputes += 1;
        debug!(
            candles = frame.candles.len(),
            indicators = frame.indicators.len(),
            warnings = frame.warnings.len(),
            revision,
            "Chart frame recomputed"
        );
        self.frame = frame;
    }

    pub fn selection(&self) -> Option<&(InstrumentId, Interval)> {
        self.selection.as_ref()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn buffer(&self) -> &CandleStreamBuffer {
        &self.buffer
    }

    pub fn preferences(&self) -> &IndicatorPreferences {
        &self.preferences
    }

    /// Number of frame recomputations so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}

/// Commands accepted by [`run_chart_session`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChartCommand {
    Select {
        instrument: InstrumentId,
        interval: Interval,
    },
    Refresh,
    Toggle(IndicatorKind),
    UpdateSettings {
        kind: IndicatorKind,
        settings: IndicatorSettings,
    },
    /// Renderer re-fitted after a seed.
    AcknowledgeAutoFit,
    Shutdown,
}

type FetchResult = (FetchTicket, Result<Vec<RawCandle>, FeedError>);

fn lock_router(router: &SharedStreamRouter) -> MutexGuard<'_, StreamRouter> {
    router.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_fetch<S>(fetches: &mut JoinSet<FetchResult>, source: &Arc<S>, ticket: FetchTicket)
where
    S: CandleSource + ?Sized + 'static,
{
    let source = Arc::clone(source);
    fetches.spawn(async move {
        let result = source.fetch_candles(&ticket.query).await;
        (ticket, result)
    });
}

async fn next_tick(subscription: &mut Option<Subscription>) -> Option<RawCandle> {
    match subscription {
        Some(sub) => sub.receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Drive a session until `Shutdown` or the command channel closes.
///
/// On a selection change the old stream subscription is torn down before
/// the new one is registered. Returns the session for inspection or
/// preference persistence.
pub async fn run_chart_session<S>(
    mut session: ChartSession,
    source: Arc<S>,
    router: SharedStreamRouter,
    mut commands: mpsc::Receiver<ChartCommand>,
    frames: watch::Sender<ChartFrame>,
) -> ChartSession
where
    S: CandleSource + ?Sized + 'static,
{
    let mut subscription: Option<Subscription> = None;
    let mut fetches: JoinSet<FetchResult> = JoinSet::new();
    let mut published = frames.borrow().revision;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(ChartCommand::Shutdown) => break,
                Some(ChartCommand::Select { instrument, interval }) => {
                    if let Some(old) = subscription.take() {
                        lock_router(&router).unsubscribe(&old);
                    }
                    let ticket = session.select(instrument.clone(), interval);
                    let (sub, _) = lock_router(&router).subscribe(&instrument);
                    subscription = Some(sub);
                    spawn_fetch(&mut fetches, &source, ticket);
                }
                Some(ChartCommand::Refresh) => {
                    if let Some(ticket) = session.begin_refresh() {
                        spawn_fetch(&mut fetches, &source, ticket);
                    }
                }
                Some(ChartCommand::Toggle(kind)) => {
                    session.toggle_indicator(kind);
                }
                Some(ChartCommand::UpdateSettings { kind, settings }) => {
                    if let Err(err) = session.update_settings(kind, &settings) {
                        warn!(indicator = %kind, error = %err, "Rejected indicator settings");
                    }
                }
                Some(ChartCommand::AcknowledgeAutoFit) => session.acknowledge_auto_fit(),
            },
            Some(joined) = fetches.join_next() => match joined {
                Ok((ticket, result)) => {
                    session.complete_fetch(ticket, result);
                }
                Err(err) => warn!(error = %err, "History fetch task failed"),
            },
            Some(raw) = next_tick(&mut subscription) => {
                session.on_tick(&raw);
            }
        }

        let frame = session.frame();
        if frame.revision != published {
            published = frame.revision;
            frames.send_replace(frame.clone());
        }
    }

    if let Some(sub) = subscription.take() {
        lock_router(&router).unsubscribe(&sub);
    }
    fetches.abort_all();
    info!("Chart session stopped");
    session
}
