//! # Quality-Driven Orchestrator
//!
//! Runs enhancement and recognition for one page, scores the result and
//! decides whether to accept it or to try again with a stronger enhancement
//! configuration.
//!
//! ```text
//! Init -> Extracting -> Assessing -> Accepted -> Done
//!                          |
//!                          +-> Escalating -> Extracting ...
//!                          +-> Exhausted   (attempt limit or ladder spent)
//!                          +-> TimedOut    (deadline passed before an attempt)
//! ```
//!
//! The loop is strictly sequential. Whatever the terminal state, the
//! highest-scoring attempt is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::error_logging;
use crate::observability;
use crate::ocr_config::{EnhancementConfig, RecognitionConfig, RetryPolicy};
use crate::preprocessing::{EnhancementPipeline, ImageQualityAssessor, QualityMetrics, StageKind};
use crate::raster::Raster;
use crate::recognition::RecognitionEngine;
use crate::text_validation::{TextQualityMetrics, TextQualityValidator};

/// Per-page processing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Init,
    Extracting,
    Assessing,
    Accepted,
    Escalating,
    Done,
    Exhausted,
    TimedOut,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Init => "init",
            OrchestratorState::Extracting => "extracting",
            OrchestratorState::Assessing => "assessing",
            OrchestratorState::Accepted => "accepted",
            OrchestratorState::Escalating => "escalating",
            OrchestratorState::Done => "done",
            OrchestratorState::Exhausted => "exhausted",
            OrchestratorState::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Done | OrchestratorState::Exhausted | OrchestratorState::TimedOut
        )
    }
}

/// One enhancement + recognition pass over a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    /// 1-based position in the attempt sequence
    pub attempt: u32,
    pub config: EnhancementConfig,
    pub applied_stages: Vec<StageKind>,
    pub image_quality: QualityMetrics,
    /// Raw engine output, before text correction
    pub text: String,
    pub text_quality: TextQualityMetrics,
    /// Engine confidence on a 0-100 scale
    pub confidence: Option<f32>,
    /// Score compared against the acceptance threshold, in [0, 1]
    pub score: f32,
    /// Set when the engine failed and the attempt carries empty text
    pub recognition_error: Option<String>,
    pub elapsed: Duration,
}

impl ExtractionAttempt {
    /// Whether this attempt should replace `other` as the best one.
    ///
    /// Higher score wins; equal scores fall back to image quality. A full tie
    /// keeps the existing attempt.
    pub fn beats(&self, other: &ExtractionAttempt) -> bool {
        if self.score != other.score {
            return self.score > other.score;
        }
        self.image_quality.composite > other.image_quality.composite
    }
}

/// Result of running the loop over one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub best: ExtractionAttempt,
    /// `Done`, `Exhausted` or `TimedOut`
    pub final_state: OrchestratorState,
    pub attempts: u32,
    /// Score of every attempt in order
    pub attempt_scores: Vec<f32>,
    pub total_elapsed: Duration,
}

/// Caps reached by repeated strengthening once the ladder's toggles are spent.
pub const MAX_ESCALATED_BLOCK_SIZE: u32 = 51;
pub const MAX_ESCALATED_DENOISE_STRENGTH: f32 = 150.0;
pub const MAX_ESCALATED_BINARIZATION_CONSTANT: f32 = 10.0;

/// One step of the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscalationStep {
    EnableCoreStages,
    Strengthen,
    EnablePerspective,
}

const ESCALATION_LADDER: [EscalationStep; 3] = [
    EscalationStep::EnableCoreStages,
    EscalationStep::Strengthen,
    EscalationStep::EnablePerspective,
];

impl EscalationStep {
    fn apply(self, config: &mut EnhancementConfig) {
        match self {
            EscalationStep::EnableCoreStages => {
                config.enable_deskew = true;
                config.enable_denoise = true;
                config.enable_contrast_enhancement = true;
                config.enable_binarization = true;
                config.enable_morphology = true;
            }
            EscalationStep::Strengthen => {
                let strength = config.denoise_strength;
                config.denoise_strength = (strength * 1.5)
                    .min(MAX_ESCALATED_DENOISE_STRENGTH)
                    .max(strength);

                if config.binarization_block_size < MAX_ESCALATED_BLOCK_SIZE {
                    let mut block = config.binarization_block_size + 4;
                    if block % 2 == 0 {
                        block += 1;
                    }
                    config.binarization_block_size = block.min(MAX_ESCALATED_BLOCK_SIZE);
                }

                let constant = config.binarization_constant;
                config.binarization_constant = (constant + 1.0)
                    .min(MAX_ESCALATED_BINARIZATION_CONSTANT)
                    .max(constant);
            }
            EscalationStep::EnablePerspective => {
                config.enable_perspective_correction = true;
            }
        }
    }
}

/// Strengthens an enhancement configuration for the given rung.
///
/// Rung 0 is the initial configuration. The ladder enables every stage except
/// perspective correction, then raises denoise strength by half, widens the
/// binarization block by 4 and raises its constant by 1, then enables
/// perspective correction. After that the strengthening step repeats until its
/// caps are reached. Steps that leave the configuration unchanged are skipped,
/// so each rung differs from the one before it until the ladder runs out.
/// Rungs past the end return the last reachable configuration.
pub fn escalate(initial: &EnhancementConfig, rung: u32) -> EnhancementConfig {
    let mut config = initial.clone();
    let mut climbed = 0;
    let steps = ESCALATION_LADDER
        .iter()
        .copied()
        .chain(std::iter::repeat(EscalationStep::Strengthen));

    for (index, step) in steps.enumerate() {
        if climbed >= rung {
            break;
        }
        let previous = config.clone();
        step.apply(&mut config);
        if config != previous {
            climbed += 1;
        } else if index >= ESCALATION_LADDER.len() {
            // Strengthening hit every cap
            break;
        }
    }
    config
}

/// Drives the accept/escalate loop for single pages.
pub struct QualityDrivenOrchestrator {
    engine: Arc<dyn RecognitionEngine>,
    validator: TextQualityValidator,
    assessor: ImageQualityAssessor,
    policy: RetryPolicy,
    language: String,
    initial_config: EnhancementConfig,
}

impl QualityDrivenOrchestrator {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        recognition: &RecognitionConfig,
        policy: RetryPolicy,
        initial_config: EnhancementConfig,
    ) -> Self {
        Self {
            engine,
            validator: TextQualityValidator::new(&recognition.language),
            assessor: ImageQualityAssessor::default(),
            policy,
            language: recognition.language.clone(),
            initial_config,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn validator(&self) -> &TextQualityValidator {
        &self.validator
    }

    /// Processes a page without a deadline.
    pub fn run(&self, raster: &Raster) -> OrchestrationOutcome {
        self.run_with_deadline(raster, None)
    }

    /// Processes a page, stopping before a new attempt once `deadline` has
    /// passed. The first attempt always runs.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::{Duration, Instant};
    /// use doc_quality::ocr_config::{EnhancementConfig, RecognitionConfig, RetryPolicy};
    /// use doc_quality::orchestrator::QualityDrivenOrchestrator;
    /// use doc_quality::raster::Raster;
    /// use doc_quality::recognition::engine_factory::build_engine;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let recognition = RecognitionConfig::default();
    /// let engine = build_engine(&recognition)?;
    /// let orchestrator = QualityDrivenOrchestrator::new(
    ///     engine,
    ///     &recognition,
    ///     RetryPolicy::default(),
    ///     EnhancementConfig::default(),
    /// );
    ///
    /// let page = Raster::from(image::open("scan.png")?);
    /// let outcome = orchestrator.run_with_deadline(&page, Some(Instant::now() + Duration::from_secs(60)));
    /// println!("{} (score {:.2})", outcome.best.text, outcome.best.score);
    /// # Ok(())
    /// # }
    /// ```
    pub fn run_with_deadline(
        &self,
        raster: &Raster,
        deadline: Option<Instant>,
    ) -> OrchestrationOutcome {
        let start_time = Instant::now();
        let threshold = self.policy.threshold_fraction();
        let max_attempts = self.policy.max_attempts.max(1);

        let mut state = OrchestratorState::Init;
        let mut best: Option<ExtractionAttempt> = None;
        let mut attempt_scores = Vec::new();
        let mut config = self.initial_config.clone();
        let mut attempt = 0u32;
        let mut last_elapsed = Duration::ZERO;

        while !state.is_terminal() {
            state = match state {
                OrchestratorState::Init | OrchestratorState::Escalating => {
                    let deadline_passed = deadline.is_some_and(|d| Instant::now() >= d);
                    if attempt > 0 && deadline_passed {
                        warn!(
                            attempt,
                            state = OrchestratorState::TimedOut.as_str(),
                            "Deadline reached, keeping best attempt so far"
                        );
                        OrchestratorState::TimedOut
                    } else {
                        OrchestratorState::Extracting
                    }
                }
                OrchestratorState::Extracting => {
                    attempt += 1;
                    let extraction = self.extract(raster, &config, attempt);
                    attempt_scores.push(extraction.score);
                    last_elapsed = extraction.elapsed;
                    let replace = best
                        .as_ref()
                        .map_or(true, |current| extraction.beats(current));
                    if replace {
                        best = Some(extraction);
                    }
                    OrchestratorState::Assessing
                }
                OrchestratorState::Assessing => {
                    let score = attempt_scores.last().copied().unwrap_or(0.0);
                    let attempt_duration = last_elapsed;

                    if score >= threshold {
                        info!(
                            attempt,
                            score,
                            threshold,
                            state = OrchestratorState::Accepted.as_str(),
                            "Attempt meets quality threshold"
                        );
                        observability::record_attempt_metrics("accepted", attempt_duration);
                        OrchestratorState::Accepted
                    } else if attempt >= max_attempts {
                        info!(
                            attempt,
                            score,
                            threshold,
                            state = OrchestratorState::Exhausted.as_str(),
                            "Attempt limit reached"
                        );
                        observability::record_attempt_metrics("exhausted", attempt_duration);
                        OrchestratorState::Exhausted
                    } else if escalate(&self.initial_config, attempt) == config {
                        info!(
                            attempt,
                            score,
                            threshold,
                            state = OrchestratorState::Exhausted.as_str(),
                            "Escalation ladder has no stronger configuration"
                        );
                        observability::record_attempt_metrics("exhausted", attempt_duration);
                        OrchestratorState::Exhausted
                    } else {
                        config = escalate(&self.initial_config, attempt);
                        info!(
                            attempt,
                            score,
                            threshold,
                            state = OrchestratorState::Escalating.as_str(),
                            "Escalating enhancement"
                        );
                        observability::record_attempt_metrics("escalated", attempt_duration);
                        observability::record_escalation();
                        OrchestratorState::Escalating
                    }
                }
                OrchestratorState::Accepted => OrchestratorState::Done,
                terminal => terminal,
            };
        }

        // The loop always runs at least one attempt before reaching a terminal state
        let best = best.unwrap_or_else(|| self.extract(raster, &config, attempt.max(1)));
        observability::record_final_score(best.score);

        debug!(
            attempts = attempt,
            best_attempt = best.attempt,
            best_score = best.score,
            final_state = state.as_str(),
            "Page processing finished"
        );

        OrchestrationOutcome {
            best,
            final_state: state,
            attempts: attempt,
            attempt_scores,
            total_elapsed: start_time.elapsed(),
        }
    }

    /// Runs one enhancement + recognition pass and scores it.
    fn extract(&self, raster: &Raster, config: &EnhancementConfig, attempt: u32) -> ExtractionAttempt {
        let start_time = Instant::now();
        let enhanced = EnhancementPipeline::new(config.clone()).run(raster);
        let image_quality = self.assessor.assess(&enhanced.raster);

        let (text, confidence, recognition_error) =
            match self.engine.recognize(&enhanced.raster, &self.language) {
                Ok(recognition) => (recognition.text, recognition.confidence, None),
                Err(e) => {
                    observability::record_recognition_failure(e.kind());
                    error_logging::log_recognition_error(
                        &e,
                        None,
                        attempt,
                        Some(start_time.elapsed()),
                    );
                    (String::new(), None, Some(e.to_string()))
                }
            };

        let text_quality = self.validator.score(&text);
        let score = combine_scores(confidence, &text_quality);

        debug!(
            attempt,
            engine = self.engine.name(),
            stages = ?enhanced.applied,
            image_quality = image_quality.composite,
            text_quality = text_quality.composite,
            confidence = ?confidence,
            score,
            "Extraction attempt scored"
        );

        ExtractionAttempt {
            attempt,
            config: config.clone(),
            applied_stages: enhanced.applied,
            image_quality,
            text,
            text_quality,
            confidence,
            score,
            recognition_error,
            elapsed: start_time.elapsed(),
        }
    }
}

/// Engine confidence, when reported, takes precedence over the text estimate.
pub fn combine_scores(confidence: Option<f32>, text_quality: &TextQualityMetrics) -> f32 {
    match confidence {
        Some(value) if value.is_finite() => (value / 100.0).clamp(0.0, 1.0),
        _ => text_quality.composite.clamp(0.0, 1.0),
    }
}
