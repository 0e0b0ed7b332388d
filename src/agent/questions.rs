//! Question generation, document analysis and assessment prompts
//!
//! Questions are produced collectively: either the model yields the full
//! requested count, or the whole set is substituted with an equal number of
//! deterministic fallback questions. A partially-generated list never
//! reaches the interview.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::core::llm::LlmHandle;
use crate::session::{Analysis, Question, Speaker, TranscriptEntry};

/// Generic question bank used when the model cannot deliver
const FALLBACK_QUESTION_BANK: &[&str] = &[
    "Can you walk me through your professional background and key experiences?",
    "What motivated you to apply for this position?",
    "Can you describe a challenging project you've worked on and how you handled it?",
    "How do you approach problem-solving in your work?",
    "What are your greatest professional strengths?",
    "Can you tell me about a time when you had to learn something new quickly?",
    "How do you handle working under pressure or meeting tight deadlines?",
    "Describe your experience working in a team environment.",
    "What tools and technologies are you most proficient with?",
    "How do you stay current with industry trends and best practices?",
    "Can you discuss a situation where you received constructive feedback and how you responded?",
    "What are your career goals and how does this position align with them?",
    "How do you prioritize tasks when working on multiple projects?",
    "Can you describe your experience with project management or coordination?",
    "What do you consider to be your most significant professional achievement?",
    "How do you handle conflicts or disagreements in a professional setting?",
    "What experience do you have with quality assurance or testing processes?",
    "How do you approach documentation and knowledge sharing?",
    "Can you discuss your experience with stakeholder communication?",
    "What strategies do you use for continuous professional development?",
];

/// Deterministic fallback set of exactly `count` questions
pub fn fallback_questions(count: usize) -> Vec<Question> {
    FALLBACK_QUESTION_BANK
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, text)| Question {
            id: (i + 1) as u32,
            text: (*text).to_string(),
        })
        .collect()
}

fn build_question_prompt(jd: &str, resume: &str, count: usize) -> String {
    format!(
        "You are an expert technical interviewer. Analyze the following job description and \
         candidate resume carefully, then generate {count} targeted interview questions.\n\n\
         JOB DESCRIPTION:\n{jd}\n\n\
         CANDIDATE RESUME:\n{resume}\n\n\
         Generate {count} thoughtful, specific interview questions that directly relate to the \
         skills, experience levels and projects mentioned in both documents, including any gaps \
         between the requirements and the resume. Questions must be conversational, in English, \
         and assess real job requirements rather than resume keywords.\n\n\
         FORMAT: Return ONLY a numbered list:\n\
         1. Question one?\n\
         2. Question two?\n\
         3. Continue exactly like this...\n\n\
         No introductions, explanations, or extra text.",
        jd = clip(jd, 4000),
        resume = clip(resume, 4000),
        count = count,
    )
}

/// Generate the interview question set.
///
/// All-or-nothing: if the model is unavailable, errors out even after its
/// retry, or yields fewer than `count` parseable questions, the whole set is
/// replaced by the fallback bank. The second tuple element reports whether
/// the fallback was used.
pub async fn generate_questions(
    llm: &LlmHandle,
    jd: &str,
    resume: &str,
    count: usize,
) -> (Vec<Question>, bool) {
    if !llm.is_available() {
        warn!("language model not available, using fallback question set");
        return (fallback_questions(count), true);
    }

    let prompt = build_question_prompt(jd, resume, count);
    let Some(text) = llm.try_generate(&prompt).await else {
        warn!("question generation failed, using fallback question set");
        return (fallback_questions(count), true);
    };

    let parsed = parse_question_lines(&text);
    if parsed.len() < count {
        warn!(
            parsed = parsed.len(),
            requested = count,
            "model produced too few questions, using fallback question set"
        );
        return (fallback_questions(count), true);
    }

    info!(count, "generated interview questions");
    let questions = parsed
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, text)| Question {
            id: (i + 1) as u32,
            text,
        })
        .collect();
    (questions, false)
}

static LEADING_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+[.)]?\s*|^[-•*]\s*|^(?i:q|question)\s*[:.]\s*").unwrap());

/// Extract question texts from a model response, tolerating numbered lists,
/// bullets and `Q:` prefixes. Lines that do not look like questions are
/// dropped.
pub fn parse_question_lines(text: &str) -> Vec<String> {
    let mut questions = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let stripped = LEADING_MARKERS.replace(line, "");
        let candidate = stripped.trim().trim_matches(['-', '"', ' ']).to_string();

        let lower = candidate.to_lowercase();
        if candidate.len() > 10
            && candidate.contains('?')
            && !lower.starts_with("here")
            && !lower.starts_with("below")
            && !lower.starts_with("above")
            && !lower.starts_with("note")
        {
            questions.push(candidate);
        }
    }
    questions
}

fn build_analysis_prompt(jd: &str, resume: &str) -> String {
    format!(
        "Analyze the following job description and resume to determine how well the candidate \
         matches the position.\n\n\
         Job Description:\n{jd}\n\n\
         Resume:\n{resume}\n\n\
         Please provide:\n\
         1. A match score from 1-10 (10 being perfect match)\n\
         2. Key skills that match between JD and resume\n\
         3. Any gaps or areas of concern\n\
         4. Overall assessment\n\n\
         Format as JSON with keys: match_score, key_skills (array), gaps (array), \
         assessment (string)",
        jd = clip(jd, 2000),
        resume = clip(resume, 2000),
    )
}

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

fn parse_analysis_response(text: &str) -> Analysis {
    let body = JSON_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    match serde_json::from_str::<Analysis>(body) {
        Ok(analysis) => analysis,
        Err(_) => {
            warn!("analysis response is not valid JSON, keeping raw assessment text");
            Analysis {
                assessment: text.trim().to_string(),
                ..Analysis::basic()
            }
        }
    }
}

/// Analyze the documents before the interview, degrading to a deterministic
/// basic analysis when the model cannot deliver.
pub async fn analyze_documents(llm: &LlmHandle, jd: &str, resume: &str) -> Analysis {
    if !llm.is_available() {
        return Analysis::basic();
    }
    match llm.try_generate(&build_analysis_prompt(jd, resume)).await {
        Some(text) => parse_analysis_response(&text),
        None => Analysis::basic(),
    }
}

/// Flatten a transcript for model consumption
pub fn format_transcript(entries: &[TranscriptEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let speaker = match entry.speaker {
            Speaker::Agent => "Interviewer",
            Speaker::Candidate => "Candidate",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&entry.text);
        out.push('\n');
    }
    out
}

/// Prompt for the final structured assessment produced at interview end
pub fn build_final_assessment_prompt(questions: &[Question], entries: &[TranscriptEntry]) -> String {
    let questions_context = if questions.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = questions
            .iter()
            .map(|q| format!("{}. {}", q.id, q.text))
            .collect();
        format!("\n\nINTERVIEW QUESTIONS ASKED:\n{}", list.join("\n"))
    };

    format!(
        "As an expert HR interviewer, analyze the following complete interview transcript and \
         provide a comprehensive final assessment report.{questions_context}\n\n\
         COMPLETE INTERVIEW TRANSCRIPT:\n{transcript}\n\
         Provide:\n\
         1. Overall Recommendation: Selected/Not Selected/Further Review with justification\n\
         2. Performance Scores out of 10 for Technical Fit, Experience, Communication, \
         Problem-Solving and Culture Fit\n\
         3. Question-by-question assessment with strengths and areas for improvement\n\
         4. Key strengths (3-5 points)\n\
         5. Concerns or weaknesses\n\
         6. A detailed hiring recommendation suitable for HR records\n\n\
         This is the FINAL assessment - provide your most comprehensive and definitive \
         evaluation.",
        transcript = format_transcript(entries),
    )
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
