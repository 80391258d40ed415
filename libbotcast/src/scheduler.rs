//! The posting loop
//!
//! One cycle runs credential refresh, generation with gating, segmentation,
//! publishing and recording, strictly in that order. [`Scheduler::run_cycle`]
//! never returns an error: anything that goes wrong is logged and the cycle
//! counts as failed. [`Scheduler::run`] repeats cycles with a fixed sleep
//! between them until the shutdown flag is raised.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use secrecy::ExposeSecret;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::credentials::{CredentialStore, HttpTokenExchange};
use crate::error::{BotcastError, Result};
use crate::finalize::{char_len, contains_ignore_case, finalize, finalize_long};
use crate::gate::{generate_until_accepted, GenerationOutcome, UniquenessGate};
use crate::generation::{Generator, HttpGenerator, PromptRotation};
use crate::history::{HistoryLedger, SiteUsageStore};
use crate::platforms::dry_run::DryRunPlatform;
use crate::platforms::x::XPlatform;
use crate::platforms::Platform;
use crate::poster::{PublishOutcome, Publisher};
use crate::scheduling::startup_delay;
use crate::thread::segment;
use crate::types::{FinalizedPost, PostPolicy};

/// Granularity at which sleeps notice a shutdown request
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// What a single cycle achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every chunk was published
    Published { ids: Vec<String> },
    /// A thread stopped part way; `ids` are the chunks that made it out
    Partial { ids: Vec<String>, total: usize },
    /// No candidate passed the gate
    Skipped { attempts: usize },
    /// Nothing was published
    Failed,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Published { ids } => write!(f, "published {} post(s)", ids.len()),
            CycleOutcome::Partial { ids, total } => {
                write!(f, "partially published ({}/{})", ids.len(), total)
            }
            CycleOutcome::Skipped { attempts } => {
                write!(f, "skipped after {} rejected attempts", attempts)
            }
            CycleOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Finalize as a single post, or for threading when a thread budget is set
/// and the draft does not fit in one post
pub fn finalize_draft<R: Rng + ?Sized>(
    draft: &str,
    policy: &PostPolicy,
    thread_budget: Option<usize>,
    rng: &mut R,
) -> FinalizedPost {
    match thread_budget {
        Some(budget) if char_len(draft.trim()) > policy.max_length => {
            finalize_long(draft, policy, budget, rng)
        }
        _ => finalize(draft, policy, rng),
    }
}

/// Sleep for `duration`, waking every second to check `shutdown`.
///
/// Returns `false` if shutdown was requested before the time was up.
pub async fn sleep_until_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(SHUTDOWN_POLL);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    !shutdown.load(Ordering::SeqCst)
}

pub struct Scheduler {
    config: Config,
    interval: Duration,
    startup_jitter: Duration,
    /// `None` in dry-run mode, where nothing needs a token
    credentials: Option<CredentialStore>,
    generator: Box<dyn Generator>,
    publisher: Publisher,
    gate: UniquenessGate,
    ledger: HistoryLedger,
    usage: SiteUsageStore,
    rotation: PromptRotation,
    rng: StdRng,
    record_history: bool,
}

impl Scheduler {
    pub fn new(
        config: Config,
        credentials: Option<CredentialStore>,
        generator: Box<dyn Generator>,
        platform: Box<dyn Platform>,
        ledger: HistoryLedger,
        usage: SiteUsageStore,
        mut rng: StdRng,
    ) -> Result<Self> {
        let interval = config.interval()?;
        let startup_jitter = config.startup_jitter()?;
        let gate = UniquenessGate::from_config(&config.gate, config.content.min_length);
        let rotation = PromptRotation::new(&config.content.prompts, &mut rng);
        Ok(Self {
            config,
            interval,
            startup_jitter,
            credentials,
            generator,
            publisher: Publisher::new(platform),
            gate,
            ledger,
            usage,
            rotation,
            rng,
            record_history: true,
        })
    }

    /// Wire up the real collaborators described by `config`.
    ///
    /// With `dry_run` set, posts go to a [`DryRunPlatform`], no tokens are
    /// loaded and nothing is written to the data directory.
    ///
    /// # Errors
    ///
    /// `CredentialError::NotFound` when `tokens.json` is missing and this is
    /// not a dry run.
    pub fn from_config(config: Config, dry_run: bool) -> Result<Self> {
        let max_length = config.content.max_length;

        let (credentials, platform): (Option<CredentialStore>, Box<dyn Platform>) = if dry_run {
            (None, Box::new(DryRunPlatform::new(Some(max_length))))
        } else {
            let exchange = HttpTokenExchange::new(
                config.platform.token_url.clone(),
                config.platform.client_id.clone(),
                config.platform.redirect_uri.clone(),
                config.platform_timeout()?,
            )?;
            let store = CredentialStore::load(config.tokens_path(), Box::new(exchange))?;
            debug!(
                "Loaded tokens from {}, access token valid until {}",
                config.tokens_path().display(),
                store.credential().expires_at.to_rfc3339()
            );
            let platform = XPlatform::new(config.platform.api_base.clone(), config.platform_timeout()?)?
                .with_character_limit(max_length);
            (Some(store), Box::new(platform))
        };

        let generator = HttpGenerator::from_config(&config.generation, config.generation_timeout()?)?;
        let ledger = HistoryLedger::open(config.history_path())?;
        info!(
            "Loaded {} history record(s) from {}",
            ledger.len(),
            config.history_path().display()
        );
        let usage = SiteUsageStore::new(config.site_usage_path());

        let mut scheduler = Self::new(
            config,
            credentials,
            Box::new(generator),
            platform,
            ledger,
            usage,
            StdRng::from_entropy(),
        )?;
        scheduler.record_history = !dry_run;
        Ok(scheduler)
    }

    /// Turn history and site-usage writes on or off
    pub fn with_recording(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the site link already went out on `date`
    ///
    /// The mark file answers directly when it is for `date`; a stale or
    /// missing mark falls back to the ledger.
    pub fn site_link_used_on(&self, date: NaiveDate) -> bool {
        match self.usage.load() {
            Some(mark) if mark.date == date => mark.used,
            _ => self.ledger.site_link_used_on(date),
        }
    }

    /// Run one cycle inside its own span; errors end the cycle, not the caller
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let span = info_span!("cycle", id = %Uuid::new_v4());
        match self.cycle(Local::now().date_naive()).instrument(span.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                span.in_scope(|| error!("Cycle failed: {}", e));
                CycleOutcome::Failed
            }
        }
    }

    async fn cycle(&mut self, today: NaiveDate) -> Result<CycleOutcome> {
        let access_token = match self.credentials.as_mut() {
            Some(store) => store.ensure_fresh().await?.access_token.expose_secret().to_string(),
            None => String::new(),
        };

        let site_link = self
            .config
            .content
            .site_link
            .clone()
            .filter(|l| !l.trim().is_empty());
        let include_link = site_link.is_some() && !self.site_link_used_on(today);
        let policy = PostPolicy::for_cycle(&self.config.content, include_link);
        debug!(
            "Policy: max {} chars, link {}",
            policy.max_length,
            if include_link { "required" } else { "forbidden" }
        );

        let generator = self.generator.as_ref();
        let rotation = &mut self.rotation;
        let rng = &mut self.rng;
        let thread_budget = self.config.content.thread_max_length;
        let policy_ref = &policy;

        let outcome = generate_until_accepted(
            &self.gate,
            &self.ledger,
            self.config.gate.max_attempts,
            |attempt| {
                let prompt = rotation.next_prompt(rng);
                let seed: u64 = rng.gen();
                async move {
                    let prompt = prompt.ok_or_else(|| {
                        BotcastError::InvalidInput("no usable prompts configured".to_string())
                    })?;
                    debug!("Attempt {} prompt: {}", attempt, prompt);
                    let draft = generator.generate(&prompt).await?;
                    let mut rng = StdRng::seed_from_u64(seed);
                    Ok::<_, BotcastError>(finalize_draft(
                        &draft,
                        policy_ref,
                        thread_budget,
                        &mut rng,
                    ))
                }
            },
        )
        .await;

        let post = match outcome {
            GenerationOutcome::Accepted { post, attempts } => {
                debug!("Accepted after {} attempt(s)", attempts);
                post
            }
            GenerationOutcome::Exhausted { attempts } => {
                warn!(
                    "No acceptable post after {} attempts; skipping this cycle",
                    attempts
                );
                return Ok(CycleOutcome::Skipped { attempts });
            }
        };

        let chunks = segment(post.as_str(), self.config.content.max_length);
        if chunks.len() > 1 {
            info!("Publishing a thread of {} posts", chunks.len());
        }
        let report = self.publisher.publish(&access_token, &chunks).await;

        if report.published_any() {
            let published = &chunks[..report.ids.len()];
            let link_published = match &site_link {
                Some(link) if policy.requires(link) => {
                    published.iter().any(|c| contains_ignore_case(c, link))
                }
                _ => false,
            };
            if self.record_history {
                self.record(&post, report.ids.clone(), link_published, today);
            }
        }

        Ok(match report.outcome() {
            PublishOutcome::Complete => CycleOutcome::Published { ids: report.ids },
            PublishOutcome::Partial => CycleOutcome::Partial {
                ids: report.ids,
                total: report.total,
            },
            PublishOutcome::Failed => CycleOutcome::Failed,
        })
    }

    /// Record a publish; write failures are logged since the post is
    /// already live
    fn record(&mut self, post: &FinalizedPost, ids: Vec<String>, link_published: bool, today: NaiveDate) {
        let preview_len = self.config.content.preview_length;
        if let Err(e) = self
            .ledger
            .record(post.as_str(), ids, link_published, preview_len)
        {
            error!("Failed to append to history: {}", e);
        }
        if link_published {
            if let Err(e) = self.usage.mark_used(today) {
                error!("Failed to update site usage mark: {}", e);
            }
        }
    }

    /// Run cycles until `shutdown` is raised
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let jitter = startup_delay(self.startup_jitter, &mut self.rng);
        if !jitter.is_zero() {
            info!("Waiting {} before the first cycle", humantime::format_duration(jitter));
            if !sleep_until_shutdown(jitter, &shutdown).await {
                info!("Shutdown requested before first cycle");
                return;
            }
        }

        info!(
            "Posting every {}",
            humantime::format_duration(self.interval)
        );
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let outcome = self.run_cycle().await;
            info!("Cycle {}", outcome);

            debug!("Sleeping for {}", humantime::format_duration(self.interval));
            if !sleep_until_shutdown(self.interval, &shutdown).await {
                break;
            }
        }
        info!("Shutdown requested, stopping scheduler");
    }
}
