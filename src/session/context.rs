use serde::{Deserialize, Serialize};

use crate::config::LiveConfig;
use crate::protocol::messages::SessionSetup;

/// How the candidate attends the interview. The text-chat mode lives in
/// the surrounding application; this engine only runs live media sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewMode {
    Voice,
    Video,
}

impl InterviewMode {
    pub fn is_video(&self) -> bool {
        matches!(self, InterviewMode::Video)
    }

    pub fn label(&self) -> &'static str {
        match self {
            InterviewMode::Voice => "voice",
            InterviewMode::Video => "video",
        }
    }
}

/// Job and candidate context handed in by the surrounding application,
/// used to build the agent's system instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewContext {
    pub job_title: String,
    pub company: String,
    pub requirements: Vec<String>,
    pub candidate_name: String,
    pub candidate_skills: Vec<String>,
}

impl InterviewContext {
    /// The Warren persona instruction: speak first, check AV quality, then
    /// probe on the candidate's experience.
    pub fn system_instruction(&self, mode: InterviewMode) -> String {
        format!(
            "You are \"Warren\", an AI recruiter for {company}.\n\
             Conducting a {mode} interview with {candidate} for {title}.\n\
             Job requirements: {requirements}.\n\
             Candidate skills: {skills}.\n\
             \n\
             Protocol:\n\
             1. SPEAK FIRST. Introduce yourself.\n\
             2. Check AV quality (\"Can you hear me?\").\n\
             3. Ask probing questions based on their experience.\n\
             4. Maintain a professional yet conversational tone.",
            company = self.company,
            mode = mode.label(),
            candidate = self.candidate_name,
            title = self.job_title,
            requirements = self.requirements.join(", "),
            skills = self.candidate_skills.join(", "),
        )
    }

    /// Connect-time configuration for the protocol client.
    pub fn session_setup(&self, mode: InterviewMode, live: &LiveConfig) -> SessionSetup {
        SessionSetup {
            model: live.model.clone(),
            system_instruction: self.system_instruction(mode),
            response_modalities: vec!["AUDIO".to_string()],
            voice_name: live.voice.clone(),
        }
    }
}
