//! Interview state machine
//!
//! Owns question progression and per-answer accumulation. The machine is
//! deliberately free of I/O: the orchestrator feeds it recognized fragments
//! with their capture instants and polls for completion, which keeps every
//! transition deterministic and unit-testable.
//!
//! Phases: awaiting-start -> question-asked(i) -> answer-accumulating(i)
//! -> ... -> wrapping-up -> ended.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::session::Question;

/// Consecutive unanswered questions tolerated before the machine proceeds
/// anyway instead of stalling
pub const MAX_CONSECUTIVE_NO_RESPONSES: u32 = 3;

/// Candidate transcript entries required before the interview may finalize
pub const MIN_CANDIDATE_ENTRIES: usize = 2;

/// Where the interview currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewPhase {
    AwaitingStart,
    QuestionAsked(usize),
    AnswerAccumulating(usize),
    WrappingUp,
    Ended,
}

/// Result of advancing past the current question
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceResult {
    NextQuestion(Question),
    Exhausted,
}

/// Refusal to finalize an interview with too little candidate speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRefusal {
    pub candidate_entries: usize,
    pub required: usize,
}

impl std::fmt::Display for FinalizeRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "interview incomplete: {} candidate responses captured, {} required",
            self.candidate_entries, self.required
        )
    }
}

/// Per-session interview progression state
pub struct InterviewMachine {
    questions: Vec<Question>,
    phase: InterviewPhase,
    current_index: usize,
    answer_buffer: String,
    last_speech: Option<Instant>,
    silence_threshold: Duration,
    no_response_count: u32,
}

impl InterviewMachine {
    pub fn new(questions: Vec<Question>, silence_threshold: Duration) -> Self {
        Self {
            questions,
            phase: InterviewPhase::AwaitingStart,
            current_index: 0,
            answer_buffer: String::new(),
            last_speech: None,
            silence_threshold,
            no_response_count: 0,
        }
    }

    pub fn phase(&self) -> InterviewPhase {
        self.phase
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    /// Mark the current question as asked and hand it back for synthesis.
    /// Returns `None` once the question list is exhausted.
    pub fn ask_current(&mut self) -> Option<Question> {
        if matches!(self.phase, InterviewPhase::WrappingUp | InterviewPhase::Ended) {
            return None;
        }
        let question = self.questions.get(self.current_index)?.clone();
        self.phase = InterviewPhase::QuestionAsked(self.current_index);
        debug!(
            question = self.current_index + 1,
            total = self.questions.len(),
            "question asked"
        );
        Some(question)
    }

    /// Accumulate one recognized fragment of the in-flight answer.
    ///
    /// The first fragment for a question moves the machine into
    /// answer-accumulating.
    pub fn record_fragment(&mut self, text: &str, at: Instant) {
        if !self.answer_buffer.is_empty() {
            self.answer_buffer.push(' ');
        }
        self.answer_buffer.push_str(text.trim());
        self.last_speech = Some(at);
        if let InterviewPhase::QuestionAsked(i) = self.phase {
            self.phase = InterviewPhase::AnswerAccumulating(i);
        }
    }

    /// Whether the in-flight answer is complete: some speech was captured
    /// and nothing new has arrived for longer than the silence threshold.
    pub fn answer_complete(&self, now: Instant) -> bool {
        match (self.phase, self.last_speech) {
            (InterviewPhase::AnswerAccumulating(_), Some(last)) => {
                now.duration_since(last) > self.silence_threshold
            }
            _ => false,
        }
    }

    /// Time left in the current silence window, `None` when no answer is in
    /// flight. Zero means the threshold has been reached.
    pub fn silence_remaining(&self, now: Instant) -> Option<Duration> {
        match (self.phase, self.last_speech) {
            (InterviewPhase::AnswerAccumulating(_), Some(last)) => Some(
                self.silence_threshold
                    .saturating_sub(now.duration_since(last)),
            ),
            _ => None,
        }
    }

    /// Whether any speech has been captured for the current question
    pub fn answer_in_progress(&self) -> bool {
        !self.answer_buffer.is_empty()
    }

    /// The answer accumulated so far for the current question
    pub fn current_answer(&self) -> &str {
        &self.answer_buffer
    }

    /// A usable answer arrived; reset the consecutive no-response counter
    pub fn note_usable_answer(&mut self) {
        self.no_response_count = 0;
    }

    /// A question yielded nothing before its timeout. Returns `true` when
    /// the ceiling is reached - the caller should proceed rather than stall.
    pub fn note_no_response(&mut self) -> bool {
        self.no_response_count += 1;
        let at_ceiling = self.no_response_count >= MAX_CONSECUTIVE_NO_RESPONSES;
        if at_ceiling {
            warn!(
                count = self.no_response_count,
                "consecutive no-response ceiling reached, proceeding anyway"
            );
        }
        at_ceiling
    }

    /// Clear per-question state and move to the next question, or to
    /// wrapping-up when none remain.
    pub fn advance(&mut self) -> AdvanceResult {
        self.answer_buffer.clear();
        self.last_speech = None;
        self.current_index += 1;
        match self.questions.get(self.current_index) {
            Some(question) => {
                self.phase = InterviewPhase::QuestionAsked(self.current_index);
                AdvanceResult::NextQuestion(question.clone())
            }
            None => {
                info!("question list exhausted, wrapping up");
                self.phase = InterviewPhase::WrappingUp;
                AdvanceResult::Exhausted
            }
        }
    }

    /// Gate on finalization: fewer than two candidate-attributed transcript
    /// entries is an incomplete interview, refused unless the caller holds
    /// an explicit override.
    pub fn can_finalize(
        &self,
        candidate_entries: usize,
        override_incomplete: bool,
    ) -> Result<(), FinalizeRefusal> {
        if candidate_entries >= MIN_CANDIDATE_ENTRIES || override_incomplete {
            Ok(())
        } else {
            Err(FinalizeRefusal {
                candidate_entries,
                required: MIN_CANDIDATE_ENTRIES,
            })
        }
    }

    pub fn end(&mut self) {
        self.phase = InterviewPhase::Ended;
    }
}
