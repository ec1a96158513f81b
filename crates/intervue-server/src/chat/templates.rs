//! Static interviewer text: welcome, opening questions, hints and prompts.

use std::fmt::Write as _;

use crate::models::{Assessment, Difficulty, Message, Sender};

/// Asked when no template matches and the model cannot produce a question.
pub const FALLBACK_QUESTION: &str = "To get started, tell me about a recent technical problem \
you solved. What was the challenge, what options did you consider, and why did you choose \
your approach?";

/// System prompt for conversational turns.
pub const INTERVIEWER_SYSTEM_PROMPT: &str = "You are a friendly but rigorous technical \
interviewer. Ask one question at a time, dig into the candidate's reasoning, and never reveal a \
full solution. Keep replies under 120 words.";

/// Opening questions keyed by lowercase topic and difficulty.
const OPENING_QUESTIONS: &[(&str, Difficulty, &str)] = &[
    (
        "arrays",
        Difficulty::Easy,
        "Given an array of integers, how would you find the largest element? Walk me through your approach.",
    ),
    (
        "arrays",
        Difficulty::Medium,
        "Given a sorted array, remove the duplicates in place and return the new length. How would you approach it?",
    ),
    (
        "arrays",
        Difficulty::Hard,
        "Given an unsorted array, find the length of the longest consecutive sequence in O(n) time. What is your plan?",
    ),
    (
        "strings",
        Difficulty::Easy,
        "How would you check whether a string is a palindrome?",
    ),
    (
        "strings",
        Difficulty::Medium,
        "Find the length of the longest substring without repeating characters. How would you solve it?",
    ),
    (
        "strings",
        Difficulty::Hard,
        "Given two strings, find the minimum window in the first that contains every character of the second. Where would you start?",
    ),
    (
        "linked lists",
        Difficulty::Easy,
        "How would you reverse a singly linked list?",
    ),
    (
        "linked lists",
        Difficulty::Medium,
        "How would you detect whether a linked list contains a cycle, and find where it begins?",
    ),
    (
        "linked lists",
        Difficulty::Hard,
        "How would you merge k sorted linked lists efficiently?",
    ),
    (
        "trees",
        Difficulty::Easy,
        "How would you compute the maximum depth of a binary tree?",
    ),
    (
        "trees",
        Difficulty::Medium,
        "How would you check whether a binary tree is a valid binary search tree?",
    ),
    (
        "trees",
        Difficulty::Hard,
        "How would you serialize and deserialize a binary tree?",
    ),
    (
        "system design",
        Difficulty::Easy,
        "How would you design a URL shortener for a small team?",
    ),
    (
        "system design",
        Difficulty::Medium,
        "How would you design a rate limiter for a public API?",
    ),
    (
        "system design",
        Difficulty::Hard,
        "How would you design a globally distributed chat service with message ordering guarantees?",
    ),
    (
        "behavioral",
        Difficulty::Easy,
        "Tell me about a project you are proud of. What was your role?",
    ),
    (
        "behavioral",
        Difficulty::Medium,
        "Describe a time you disagreed with a teammate on a technical decision. How was it resolved?",
    ),
    (
        "behavioral",
        Difficulty::Hard,
        "Tell me about a production incident you owned end to end. What would you do differently?",
    ),
];

/// First frame of a fresh session.
#[must_use]
pub fn welcome_message(assessment: &Assessment) -> String {
    let mut welcome = format!(
        "Welcome to your {} interview on {}.",
        assessment.difficulty, assessment.topic
    );
    if !assessment.role.is_empty() {
        let _ = write!(welcome, " We'll approach it as a {} interview.", assessment.role);
    }
    welcome.push_str(
        " Think out loud and ask for a hint whenever you get stuck.",
    );
    welcome
}

/// Template opening question for the assessment's topic and difficulty.
#[must_use]
pub fn opening_question(topic: &str, difficulty: Difficulty) -> Option<&'static str> {
    let topic = topic.trim().to_lowercase();
    OPENING_QUESTIONS
        .iter()
        .find(|(t, d, _)| *t == topic && *d == difficulty)
        .map(|(_, _, question)| *question)
}

/// Static hint for the assessment's difficulty.
#[must_use]
pub const fn hint(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Start with the simplest approach that works, even if it is slow. Write down a small example and trace it by hand."
        }
        Difficulty::Medium => {
            "Think about which data structure gives you fast lookups. Can one pass with a pointer or a hash map replace the nested loop?"
        }
        Difficulty::Hard => {
            "Break the problem into subproblems and state the invariant you need to maintain. Consider the edge cases before optimising."
        }
    }
}

/// User prompt asking the model for an opening question.
#[must_use]
pub fn opening_question_prompt(assessment: &Assessment) -> String {
    let mut prompt = format!(
        "Write the opening question for a {} difficulty interview on {}.",
        assessment.difficulty, assessment.topic
    );
    if !assessment.role.is_empty() {
        let _ = write!(prompt, " The candidate is interviewing for {}.", assessment.role);
    }
    if !assessment.skill_targets.is_empty() {
        let _ = write!(
            prompt,
            " Focus on: {}.",
            assessment.skill_targets.join(", ")
        );
    }
    if let Some(question) = &assessment.question {
        let _ = write!(prompt, " Base it on this problem: {question}");
    }
    prompt.push_str(" Reply with the question only.");
    prompt
}

/// User prompt carrying the recent conversation for the next interviewer turn.
#[must_use]
pub fn conversation_prompt(assessment: &Assessment, history: &[Message]) -> String {
    let mut prompt = format!(
        "Interview topic: {} ({} difficulty).\n\nConversation so far:\n",
        assessment.topic, assessment.difficulty
    );
    for message in history {
        let speaker = match message.sender {
            Sender::User => "Candidate",
            Sender::Ai => "Interviewer",
        };
        let _ = writeln!(prompt, "{speaker}: {}", message.content);
    }
    prompt.push_str("\nRespond as the interviewer.");
    prompt
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::NewAssessment;

    fn assessment(topic: &str) -> Assessment {
        Assessment::new(
            Uuid::new_v4(),
            NewAssessment {
                topic: topic.to_string(),
                role: "Backend Engineer".to_string(),
                difficulty: Difficulty::Medium,
                skill_targets: vec![],
                question: None,
                context: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_opening_question_matches_case_insensitively() {
        assert!(opening_question(" Arrays ", Difficulty::Medium)
            .unwrap()
            .contains("remove the duplicates"));
        assert!(opening_question("graphs", Difficulty::Easy).is_none());
    }

    #[test]
    fn test_every_topic_covers_every_difficulty() {
        for (topic, _, _) in OPENING_QUESTIONS {
            for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
                assert!(opening_question(topic, difficulty).is_some(), "{topic}/{difficulty}");
            }
        }
    }

    #[test]
    fn test_welcome_names_topic_and_role() {
        let welcome = welcome_message(&assessment("Arrays"));
        assert!(welcome.contains("medium interview on Arrays"));
        assert!(welcome.contains("Backend Engineer"));
    }

    #[test]
    fn test_conversation_prompt_labels_speakers() {
        let a = assessment("Arrays");
        let history = vec![
            Message::new(a.id, Sender::Ai, "How would you start?"),
            Message::new(a.id, Sender::User, "With a hash set."),
        ];
        let prompt = conversation_prompt(&a, &history);
        assert!(prompt.contains("Interviewer: How would you start?"));
        assert!(prompt.contains("Candidate: With a hash set."));
    }
}
