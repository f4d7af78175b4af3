//! Prompting strategies and the pure transform that renders a task into a
//! concrete prompt for a given `(strategy, length_class)` pair.
//!
//! Every strategy owns a distinct template per length class. The short,
//! medium and long texts are authored separately: a shorter variant is never
//! produced by cutting down a longer one, so verbosity effects are not mixed
//! up with content effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task::{Task, TaskType};
use crate::error::CoreError;

/// Output-format constraint declared by every reasoning-style strategy.
pub const FINAL_ANSWER_CONSTRAINT: &str = "Final answer: <one word>";

// ===== Strategy =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Baseline,
    #[serde(alias = "fewshot")]
    FewShot,
    #[serde(alias = "cot")]
    ChainOfThought,
    React,
    #[serde(alias = "tot")]
    TreeOfThoughts,
}

impl Strategy {
    /// All strategies in canonical order.
    pub const ALL: [Strategy; 5] = [
        Strategy::Baseline,
        Strategy::FewShot,
        Strategy::ChainOfThought,
        Strategy::React,
        Strategy::TreeOfThoughts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Baseline => "baseline",
            Strategy::FewShot => "few_shot",
            Strategy::ChainOfThought => "chain_of_thought",
            Strategy::React => "react",
            Strategy::TreeOfThoughts => "tree_of_thoughts",
        }
    }

    /// Whether the strategy asks the model to reason before answering.
    pub fn is_reasoning(&self) -> bool {
        matches!(
            self,
            Strategy::ChainOfThought | Strategy::React | Strategy::TreeOfThoughts
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "baseline" => Ok(Strategy::Baseline),
            "few_shot" | "fewshot" => Ok(Strategy::FewShot),
            "chain_of_thought" | "cot" => Ok(Strategy::ChainOfThought),
            "react" => Ok(Strategy::React),
            "tree_of_thoughts" | "tot" => Ok(Strategy::TreeOfThoughts),
            other => Err(CoreError::Validation(format!("unknown strategy: {}", other))),
        }
    }
}

// ===== Length Class =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LengthClass {
    Short,
    Medium,
    Long,
}

impl LengthClass {
    /// All length classes ordered from least to most verbose.
    pub const ALL: [LengthClass; 3] = [LengthClass::Short, LengthClass::Medium, LengthClass::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthClass::Short => "short",
            LengthClass::Medium => "medium",
            LengthClass::Long => "long",
        }
    }

    /// Number of demonstrations the few-shot strategy includes.
    pub fn few_shot_examples(&self) -> usize {
        match self {
            LengthClass::Short => 1,
            LengthClass::Medium => 3,
            LengthClass::Long => 5,
        }
    }

    /// Number of candidate reasoning branches for tree-of-thoughts.
    pub fn thought_branches(&self) -> usize {
        match self {
            LengthClass::Short => 2,
            LengthClass::Medium => 3,
            LengthClass::Long => 4,
        }
    }
}

impl fmt::Display for LengthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(LengthClass::Short),
            "medium" => Ok(LengthClass::Medium),
            "long" => Ok(LengthClass::Long),
            other => Err(CoreError::Validation(format!("unknown length class: {}", other))),
        }
    }
}

// ===== Few-shot demonstrations =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
}

impl FewShotExample {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

const SENTIMENT_EXAMPLES: [(&str, &str); 5] = [
    ("The service was slow and the food arrived cold.", "negative"),
    ("What a wonderful surprise, I enjoyed every minute!", "positive"),
    ("I would never buy this product again.", "negative"),
    ("The staff were friendly and the room was spotless.", "positive"),
    ("The plot dragged and the ending made no sense.", "negative"),
];

const MATH_EXAMPLES: [(&str, &str); 5] = [
    ("What is 3 + 4?", "7"),
    ("What is 9 - 6?", "3"),
    ("What is 5 * 4?", "20"),
    ("What is 18 / 3?", "6"),
    ("What is 11 + 12?", "23"),
];

const LOGIC_EXAMPLES: [(&str, &str); 5] = [
    ("If all cats are mammals and Tom is a cat, is Tom a mammal?", "yes"),
    ("If no fish can fly and Nemo is a fish, can Nemo fly?", "no"),
    ("If every square is a rectangle, is every rectangle a square?", "no"),
    ("If A is taller than B and B is taller than C, is A taller than C?", "yes"),
    ("If some birds cannot fly, do all birds fly?", "no"),
];

const GENERIC_EXAMPLES: [(&str, &str); 5] = [
    ("What colour is a clear daytime sky?", "blue"),
    ("Which planet do we live on?", "earth"),
    ("What is frozen water called?", "ice"),
    ("How many legs does a spider have, in words?", "eight"),
    ("What is the opposite of hot?", "cold"),
];

fn builtin_examples(task_type: &TaskType) -> &'static [(&'static str, &'static str); 5] {
    match task_type {
        TaskType::Sentiment => &SENTIMENT_EXAMPLES,
        TaskType::Math => &MATH_EXAMPLES,
        TaskType::Logic => &LOGIC_EXAMPLES,
        TaskType::Other(_) => &GENERIC_EXAMPLES,
    }
}

/// Picks `k` demonstrations, cycling through an override bank when one is
/// configured and falling back to the built-in bank for the task type.
fn select_examples(task_type: &TaskType, overrides: &[FewShotExample], k: usize) -> Vec<(String, String)> {
    if overrides.is_empty() {
        builtin_examples(task_type)
            .iter()
            .cycle()
            .take(k)
            .map(|(input, output)| (input.to_string(), output.to_string()))
            .collect()
    } else {
        overrides
            .iter()
            .cycle()
            .take(k)
            .map(|ex| (ex.input.clone(), ex.output.clone()))
            .collect()
    }
}

fn answer_hint(task_type: &TaskType) -> &'static str {
    match task_type {
        TaskType::Sentiment => "The answer is either positive or negative.",
        TaskType::Math => "The answer is a single number written with digits.",
        TaskType::Logic => "The answer is either yes or no.",
        TaskType::Other(_) => "The answer is a single word.",
    }
}

// ===== Prompt Variant =====

/// A `(strategy, length_class)` pair. Stateless and reusable across tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromptVariant {
    pub strategy: Strategy,
    pub length_class: LengthClass,
}

impl PromptVariant {
    pub fn new(strategy: Strategy, length_class: LengthClass) -> Self {
        Self {
            strategy,
            length_class,
        }
    }

    /// Renders the prompt with the built-in few-shot bank.
    pub fn render(&self, task: &Task) -> String {
        self.render_with(task, &[])
    }

    /// Renders the prompt; `examples` replaces the built-in few-shot bank when
    /// non-empty. Pure: the same inputs always produce the same string.
    pub fn render_with(&self, task: &Task, examples: &[FewShotExample]) -> String {
        match self.strategy {
            Strategy::Baseline => render_baseline(task, self.length_class),
            Strategy::FewShot => render_few_shot(task, self.length_class, examples),
            Strategy::ChainOfThought => render_chain_of_thought(task, self.length_class),
            Strategy::React => render_react(task, self.length_class),
            Strategy::TreeOfThoughts => render_tree_of_thoughts(task, self.length_class),
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.strategy, self.length_class)
    }
}

fn render_baseline(task: &Task, length: LengthClass) -> String {
    let content = &task.base_content;
    match length {
        LengthClass::Short => format!("{}\nAnswer in one word:", content),
        LengthClass::Medium => format!(
            "Answer the following {} question with exactly one word. {}\n\nQuestion: {}\nAnswer:",
            task.task_type,
            answer_hint(&task.task_type),
            content
        ),
        LengthClass::Long => format!(
            "You are taking part in a controlled study of how language models follow \
             answer-format instructions. Read the {} task below carefully. {} \
             Respond with exactly one word: no punctuation, no explanation and no \
             restatement of the question.\n\nTask: {}\n\nOne-word answer:",
            task.task_type,
            answer_hint(&task.task_type),
            content
        ),
    }
}

fn render_few_shot(task: &Task, length: LengthClass, overrides: &[FewShotExample]) -> String {
    let examples = select_examples(&task.task_type, overrides, length.few_shot_examples());
    let content = &task.base_content;

    match length {
        LengthClass::Short => {
            let (input, output) = &examples[0];
            format!("{} => {}\n{} =>", input, output, content)
        }
        LengthClass::Medium => {
            let mut prompt = String::from("Answer with one word, following the examples.\n\n");
            for (input, output) in &examples {
                prompt.push_str(&format!("Input: {}\nOutput: {}\n\n", input, output));
            }
            prompt.push_str(&format!("Input: {}\nOutput:", content));
            prompt
        }
        LengthClass::Long => {
            let mut prompt = format!(
                "Below are worked examples of correct responses to {} tasks. Every \
                 answer is a single word. Study the pattern, then answer the final \
                 input in exactly the same way. {}\n\n",
                task.task_type,
                answer_hint(&task.task_type)
            );
            for (idx, (input, output)) in examples.iter().enumerate() {
                prompt.push_str(&format!(
                    "Example {}\nInput: {}\nOutput: {}\n\n",
                    idx + 1,
                    input,
                    output
                ));
            }
            prompt.push_str(&format!("Now the real task.\nInput: {}\nOutput:", content));
            prompt
        }
    }
}

fn render_chain_of_thought(task: &Task, length: LengthClass) -> String {
    let content = &task.base_content;
    match length {
        LengthClass::Short => format!(
            "{}\nThink step by step, then end with the line \"{}\".",
            content, FINAL_ANSWER_CONSTRAINT
        ),
        LengthClass::Medium => format!(
            "Solve the following {} task. Think through it step by step before \
             answering. {}\n\nTask: {}\n\nAfter your reasoning, write the last line \
             exactly as:\n{}",
            task.task_type,
            answer_hint(&task.task_type),
            content,
            FINAL_ANSWER_CONSTRAINT
        ),
        LengthClass::Long => format!(
            "You are a careful analyst. Work through the {} task below one step at a \
             time: restate what is being asked, list the relevant facts, reason about \
             them, and check your conclusion before committing to it. {}\n\nTask: {}\n\n\
             Your reply must end with a single line in exactly this format, with one \
             word after the colon and nothing else on that line:\n{}",
            task.task_type,
            answer_hint(&task.task_type),
            content,
            FINAL_ANSWER_CONSTRAINT
        ),
    }
}

fn render_react(task: &Task, length: LengthClass) -> String {
    let content = &task.base_content;
    match length {
        LengthClass::Short => format!(
            "{}\nUse Thought / Action / Observation steps, then finish with \"{}\".",
            content, FINAL_ANSWER_CONSTRAINT
        ),
        LengthClass::Medium => format!(
            "Answer the task by alternating Thought, Action and Observation lines. \
             Actions are limited to recall[fact] and compute[expression]. {}\n\
             When you are done, write:\n{}\n\nTask: {}\nThought:",
            answer_hint(&task.task_type),
            FINAL_ANSWER_CONSTRAINT,
            content
        ),
        LengthClass::Long => format!(
            "You are an agent that solves {} tasks by interleaving reasoning and \
             actions. Use this loop as many times as needed:\n\
             Thought: what you know and what you still need\n\
             Action: recall[fact] or compute[expression]\n\
             Observation: the result of the action\n\
             Stop looping once the answer is certain. {}\n\n\
             The final line of your reply must be exactly:\n{}\n\nTask: {}\nThought:",
            task.task_type,
            answer_hint(&task.task_type),
            FINAL_ANSWER_CONSTRAINT,
            content
        ),
    }
}

fn render_tree_of_thoughts(task: &Task, length: LengthClass) -> String {
    let content = &task.base_content;
    let branches = length.thought_branches();
    match length {
        LengthClass::Short => format!(
            "{}\nSketch {} different ways to answer, keep the best, then end with \"{}\".",
            content, branches, FINAL_ANSWER_CONSTRAINT
        ),
        LengthClass::Medium => format!(
            "Consider {} independent lines of reasoning for the {} task below. Briefly \
             evaluate each one and keep the most convincing. {}\n\nTask: {}\n\n\
             Finish with:\n{}",
            branches,
            task.task_type,
            answer_hint(&task.task_type),
            content,
            FINAL_ANSWER_CONSTRAINT
        ),
        LengthClass::Long => format!(
            "Imagine {} experts independently attempting the {} task below. Each expert \
             writes one step of reasoning at a time and shares it with the group; any \
             expert whose reasoning turns out to be wrong drops out. Continue until the \
             remaining experts agree. {}\n\nTask: {}\n\nReport only the agreed answer \
             on the last line, formatted exactly as:\n{}",
            branches,
            task.task_type,
            answer_hint(&task.task_type),
            content,
            FINAL_ANSWER_CONSTRAINT
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentiment_task() -> Task {
        Task::new(
            "sentiment_1",
            TaskType::Sentiment,
            "I loved the movie, it was fantastic!",
            "positive",
        )
    }

    #[test]
    fn every_variant_contains_the_task_content() {
        let task = sentiment_task();
        for strategy in Strategy::ALL {
            for length in LengthClass::ALL {
                let prompt = PromptVariant::new(strategy, length).render(&task);
                assert!(
                    prompt.contains(&task.base_content),
                    "{}/{} dropped the task content",
                    strategy,
                    length
                );
            }
        }
    }

    #[test]
    fn reasoning_strategies_declare_final_answer_constraint() {
        let task = sentiment_task();
        for strategy in Strategy::ALL.into_iter().filter(Strategy::is_reasoning) {
            for length in LengthClass::ALL {
                let prompt = PromptVariant::new(strategy, length).render(&task);
                assert!(prompt.contains(FINAL_ANSWER_CONSTRAINT));
            }
        }
    }

    #[test]
    fn short_variant_is_not_a_truncation_of_long() {
        let task = sentiment_task();
        for strategy in Strategy::ALL {
            let short = PromptVariant::new(strategy, LengthClass::Short).render(&task);
            let long = PromptVariant::new(strategy, LengthClass::Long).render(&task);
            assert!(short.len() < long.len());
            assert!(!long.starts_with(&short));
        }
    }

    #[test]
    fn few_shot_example_count_grows_with_length() {
        let task = sentiment_task();
        let medium = PromptVariant::new(Strategy::FewShot, LengthClass::Medium).render(&task);
        let long = PromptVariant::new(Strategy::FewShot, LengthClass::Long).render(&task);
        // The task itself adds one more "Input:" line.
        assert_eq!(medium.matches("Input:").count(), 3 + 1);
        assert_eq!(long.matches("Input:").count(), 5 + 1);
    }

    #[test]
    fn override_bank_is_cycled() {
        let task = sentiment_task();
        let bank = vec![FewShotExample::new("custom in", "custom")];
        let prompt = PromptVariant::new(Strategy::FewShot, LengthClass::Medium).render_with(&task, &bank);
        assert_eq!(prompt.matches("custom in").count(), 3);
    }

    #[test]
    fn strategy_parsing_accepts_aliases() {
        assert_eq!("cot".parse::<Strategy>().unwrap(), Strategy::ChainOfThought);
        assert_eq!("few-shot".parse::<Strategy>().unwrap(), Strategy::FewShot);
        assert!("unknown".parse::<Strategy>().is_err());
    }
}
