//! Matcher and obstruction collaborators
//!
//! Image classification runs in an external vision process that attaches a
//! [`FrameReport`] to each frame. The adapters here turn those reports into
//! match results and obstruction decisions for the admission controller.

use thiserror::Error;

use crate::domain::types::{Frame, FrameReport, MatchResult};

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("frame carries no vision report")]
    MissingReport,
    #[error("vision report has no score")]
    MissingScore,
    #[error("matcher failed: {0}")]
    Failed(String),
    #[error("unknown matcher \"{0}\"")]
    Unknown(String),
}

/// Matcher selected by name in the configuration
pub fn build_matcher(name: &str, threshold: f64) -> Result<Box<dyn Matcher>, MatcherError> {
    match name {
        "remote" => Ok(Box::new(RemoteMatcher::new(threshold))),
        other => Err(MatcherError::Unknown(other.to_string())),
    }
}

/// Scores one frame during a session
pub trait Matcher: Send {
    fn name(&self) -> &str;
    fn match_frame(&mut self, frame: &Frame) -> Result<MatchResult, MatcherError>;
}

/// Decides whether something is blocking the camera view
pub trait ObstructionDetector: Send {
    fn is_obstructed(&mut self, frame: &Frame) -> Result<bool, MatcherError>;
}

fn report(frame: &Frame) -> Result<&FrameReport, MatcherError> {
    frame.report.as_ref().ok_or(MatcherError::MissingReport)
}

/// Applies a success threshold to scores computed by the vision process
#[derive(Debug, Clone)]
pub struct RemoteMatcher {
    threshold: f64,
}

impl RemoteMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Matcher for RemoteMatcher {
    fn name(&self) -> &str {
        "remote"
    }

    fn match_frame(&mut self, frame: &Frame) -> Result<MatchResult, MatcherError> {
        let report = report(frame)?;
        let score = report.score.ok_or(MatcherError::MissingScore)?;
        if !(0.0..=1.0).contains(&score) {
            return Err(MatcherError::Failed(format!("score {score} outside 0..=1")));
        }

        let success = score >= self.threshold;
        let description = if report.description.is_empty() {
            if success { "Match".to_string() } else { "No match".to_string() }
        } else {
            report.description.clone()
        };

        let mut result = MatchResult::new(score, success, report.direction).with_description(description);
        for step in &report.steps {
            result
                .push_step(step.clone())
                .map_err(|e| MatcherError::Failed(e.to_string()))?;
        }
        Ok(result)
    }
}

/// Reads the obstruction flag from the vision report
#[derive(Debug, Clone, Default)]
pub struct ReportObstruction;

impl ObstructionDetector for ReportObstruction {
    fn is_obstructed(&mut self, frame: &Frame) -> Result<bool, MatcherError> {
        Ok(report(frame)?.obstructed)
    }
}
