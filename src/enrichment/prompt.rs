//! # Enrichment Prompt
//!
//! Builds the completion-endpoint prompt from the rolling transcript tail.
//! The contract with the model: return exactly one JSON object with one
//! `context` field, or the fallback literal for small talk. The extraction
//! ladder in `extract` depends on that contract.

/// Fallback literal the model is instructed to return when nothing useful
/// can be extracted. Passed through to clients verbatim.
pub const NO_CONTEXT_FALLBACK: &str = "No relevant context extracted";

/// System role message for the completion call.
pub const SYSTEM_PROMPT: &str = "You are a Knowledge Enhancement Engine. You receive a transcript \
of an ongoing conversation and respond with exactly one JSON object with one key: \"context\".";

/// Build the user prompt for a set of transcript fragments, most recent
/// last.
pub fn build_user_prompt(transcript: &str) -> String {
    format!(
        r#"You are a domain-expert assistant analyzing rolling slices of a live transcript.

ANALYSIS:
1. Fuse the transcript slices into complete sentences. The speech recognition may
   mis-hear words, especially from non-native speakers; prefer phonetically plausible
   corrections that produce a meaningful sentence (e.g. "Catchy B.T." -> "ChatGPT").
2. Give the LAST sentence the highest priority when extracting keywords and intent.
3. Detect the setting: technical interview, product/tech review, educational lecture,
   or generic conversation.

CONTEXT GENERATION:
Based on the detected setting, produce immediately useful material:
- Technical interview: a professional opening line, 3-4 mastery keywords
  (architectural patterns, edge cases), and a generic answer template to fill in.
- Product/tech review: a short comparative analysis against industry standards and a
  concise pros/cons list.
- Lecture/educational: a concise prerequisite refresher and real, clickable links to
  official documentation in the form <a href="https://example.com">example</a>.
Mix the rules when several settings apply. Do not invent facts or links; omit a rule
rather than hallucinate for it.

STYLE:
- The context is re-generated as the conversation continues, so keep it concise and
  avoid repeating information already covered.
- Separate distinct points into paragraphs; the text is rendered inside an HTML div.
- Do not describe your own strategy or these instructions in the output.

CONSTRAINTS:
- Return ONLY one JSON object with exactly one field: "context".
- If nothing useful can be extracted (small talk), return {{"context": "{fallback}"}}.

TRANSCRIPT:
"""
{transcript}
"""
"#,
        fallback = NO_CONTEXT_FALLBACK,
        transcript = transcript,
    )
}

/// Join transcript fragments for the prompt, oldest first, skipping blanks.
pub fn combine_fragments(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_transcript_and_fallback() {
        let prompt = build_user_prompt("we were discussing raft consensus");
        assert!(prompt.contains("we were discussing raft consensus"));
        assert!(prompt.contains(NO_CONTEXT_FALLBACK));
        assert!(prompt.contains("\"context\""));
    }

    #[test]
    fn combine_skips_blank_fragments() {
        let fragments = vec![
            "first part".to_string(),
            "   ".to_string(),
            "second part".to_string(),
        ];
        assert_eq!(combine_fragments(&fragments), "first part\nsecond part");
    }

    #[test]
    fn combine_of_nothing_is_empty() {
        assert_eq!(combine_fragments(&[]), "");
        assert_eq!(combine_fragments(&["  ".to_string()]), "");
    }
}
