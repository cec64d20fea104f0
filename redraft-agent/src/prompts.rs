//! Prompt templates for the generate/review loop

use redraft_engine::patch::BLOCK_DELIMITER;

/// System instruction for every revision round after the first.
pub const IMPROVE_SYSTEM: &str = "You are a senior software engineer revising your own work. \
Apply every piece of review feedback you are given to the previous implementation. \
Respond only with patch blocks in the established format; do not explain your changes.";

/// User instruction for each review call.
pub const REVIEW_USER: &str = "Review the implementation above. List concrete problems and \
improvements: correctness bugs, missing edge cases, unclear naming, dead code. \
Be specific and actionable; do not rewrite the code yourself.";

/// First-round user instruction teaching the block wire format.
pub fn kickoff_user() -> String {
    format!(
        r#"Produce your implementation as one or more patch blocks. Each block edits one file and has this exact shape:

{d}
{{"file": "relative/path.ext", "blockId": "unique-id", "startLine": 1, "operation": "append"}}
<content lines>
{d}

Rules:
- The delimiter line is exactly fifty '-' characters.
- The metadata line is a single-line JSON object with exactly the keys file, blockId, startLine and operation.
- operation is one of "append", "modify", "insert", "delete".
- "append" adds the content to the end of the file; startLine must still be a positive integer.
- "modify" replaces the lines starting at startLine that the content spans.
- "insert" places the content as a new line before startLine.
- "delete" removes the lines starting at startLine that the content spans.
- Lines are 1-indexed.

Output only patch blocks, nothing else."#,
        d = BLOCK_DELIMITER
    )
}

/// System instruction for a review call, embedding the just-generated text.
pub fn review_system(generated: &str) -> String {
    format!(
        "You are a meticulous code reviewer. The implementation under review is:\n\n{}\n\n\
Critique it against the task it was written for.",
        generated
    )
}

/// User message folding the previous output and its review into a revision request.
pub fn revision_user(previous: &str, feedback: &str) -> String {
    format!(
        "Previous implementation:\n\n{}\n\nReview feedback:\n\n{}\n\n\
Implement all of the suggestions above. Respond with patch blocks only.",
        previous, feedback
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kickoff_embeds_delimiter() {
        let prompt = kickoff_user();
        assert!(prompt.contains(BLOCK_DELIMITER));
        assert!(prompt.contains("\"append\", \"modify\", \"insert\", \"delete\""));
    }

    #[test]
    fn test_review_system_embeds_generated_text() {
        let prompt = review_system("THE GENERATED BODY");
        assert!(prompt.contains("THE GENERATED BODY"));
    }

    #[test]
    fn test_revision_user_folds_both_parts() {
        let prompt = revision_user("impl text", "review text");
        assert!(prompt.contains("impl text"));
        assert!(prompt.contains("review text"));
        assert!(prompt.contains("all of the suggestions"));
    }
}
