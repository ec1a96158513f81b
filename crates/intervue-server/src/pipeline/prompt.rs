//! Prompt construction for feedback and practice generation.
//!
//! Prompts are deterministic functions of their inputs. The only varying
//! part of a prompt's identity is the timestamp folded into [`prompt_id`].

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::{Assessment, Difficulty, FeedbackRun, Rubric};

/// System prompt for scoring a response.
pub const FEEDBACK_SYSTEM_PROMPT: &str = "You are an experienced technical interviewer \
evaluating a candidate's answer. Be specific, fair and constructive. Respond with a single \
JSON object and nothing else.";

/// System prompt for generating practice items.
pub const PRACTICE_SYSTEM_PROMPT: &str = "You are an interview coach who designs short, \
targeted practice drills. Respond with a single JSON object and nothing else.";

/// Identity of a prompt: the first 16 hex chars of
/// `sha256("<kind>|<version>|<timestamp>")`.
#[must_use]
pub fn prompt_id(kind: &str, version: &str, at: DateTime<Utc>) -> String {
    let digest = Sha256::digest(format!("{kind}|{version}|{}", at.to_rfc3339()).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(16);
    id
}

fn push_context(prompt: &mut String, assessment: &Assessment) {
    let _ = writeln!(prompt, "Topic: {}", assessment.topic);
    if !assessment.role.is_empty() {
        let _ = writeln!(prompt, "Role: {}", assessment.role);
    }
    let _ = writeln!(prompt, "Difficulty: {}", assessment.difficulty);
    if !assessment.skill_targets.is_empty() {
        let _ = writeln!(prompt, "Skills targeted: {}", assessment.skill_targets.join(", "));
    }
    if let Some(question) = &assessment.question {
        let _ = writeln!(prompt, "Question: {question}");
    }
    if let Some(context) = &assessment.context {
        let _ = writeln!(prompt, "Background: {context}");
    }
}

/// User prompt asking the model to score `answer`.
#[must_use]
pub fn feedback_prompt(assessment: &Assessment, answer: &str, rubric: Option<&Rubric>) -> String {
    let mut prompt = String::from("Evaluate the candidate's response to this interview.\n\n");
    push_context(&mut prompt, assessment);

    let _ = write!(prompt, "\nCandidate response:\n\"\"\"\n{}\n\"\"\"\n", answer.trim());

    let criteria: Vec<&str> = match rubric {
        Some(rubric) => {
            let _ = writeln!(prompt, "\nScore against the rubric \"{}\" (v{}):", rubric.name, rubric.version);
            for criterion in &rubric.criteria {
                let _ = writeln!(
                    prompt,
                    "- {} (weight {}): {}",
                    criterion.name, criterion.weight, criterion.description
                );
            }
            rubric.criteria.iter().map(|c| c.name.as_str()).collect()
        }
        None => vec!["correctness", "communication", "complexity_analysis"],
    };

    let _ = write!(
        prompt,
        "\nReturn JSON with exactly these fields:\n\
         - \"overall_score\": number from 0 to 100\n\
         - \"criterion_scores\": object mapping each of [{}] to a number from 0 to 100\n\
         - \"strengths\": list of strings\n\
         - \"weaknesses\": list of strings\n\
         - \"suggestions\": list of strings, most important first\n\
         - \"detailed_feedback\": string\n\
         - \"safety_flags\": list of strings naming any inappropriate content, empty if none\n",
        criteria.join(", ")
    );
    prompt
}

/// User prompt asking for `count` practice items built on a completed run.
#[must_use]
pub fn practice_prompt(
    assessment: &Assessment,
    run: &FeedbackRun,
    count: usize,
    plan: Option<&[Difficulty]>,
) -> String {
    let mut prompt = format!(
        "Create exactly {count} practice items for a candidate who just finished this interview.\n\n"
    );
    push_context(&mut prompt, assessment);

    if let Some(score) = run.score {
        let _ = writeln!(prompt, "Score: {score:.0}/100");
    }
    if run.weaknesses.is_empty() {
        prompt.push_str("\nNo specific weaknesses were recorded; reinforce the topic fundamentals.\n");
    } else {
        prompt.push_str("\nWeaknesses to target:\n");
        for weakness in &run.weaknesses {
            let _ = writeln!(prompt, "- {weakness}");
        }
    }

    if let Some(plan) = plan {
        let levels: Vec<&str> = plan.iter().map(|d| d.as_str()).collect();
        let _ = writeln!(
            prompt,
            "\nOrder the items by difficulty, in this sequence: {}.",
            levels.join(", ")
        );
    } else {
        let _ = writeln!(prompt, "\nPitch every item at {} difficulty.", assessment.difficulty);
    }

    prompt.push_str(
        "\nReturn JSON of the form {\"practices\": [...]} where each item has:\n\
         - \"type\": one of \"question\", \"code_exercise\", \"concept_review\", \"mock_scenario\"\n\
         - \"difficulty\": one of \"easy\", \"medium\", \"hard\"\n\
         - \"target_weakness\": the weakness it addresses\n\
         - \"prompt\": what the candidate should do\n\
         - \"expected_answer\": a model answer\n\
         - \"hints\": list of short hints\n\
         - \"sequence_order\": zero-based position\n",
    );
    prompt
}
