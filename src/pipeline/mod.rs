pub mod category;
pub mod classify;
pub mod redaction;
pub mod segment;
pub mod team;

use crate::config::Rules;
use crate::model::{Intervention, Message, TeamMember};

pub struct PipelineOutput {
    pub interventions: Vec<Intervention>,
    pub team: Vec<TeamMember>,
}

/// Full pipeline: OFF-rule redaction, segmentation into interventions
/// (with before/after classification), team roster extraction.
///
/// The roster is built from the redacted message set so off-the-record
/// content never leaks into mention scanning.
pub fn process(messages: &[Message], rules: &Rules) -> PipelineOutput {
    let filtered = redaction::apply(messages, rules);
    let interventions = segment::group(&filtered, rules);
    let team = team::extract(&filtered, rules);
    PipelineOutput {
        interventions,
        team,
    }
}
