//! Response extraction for raw completions that still carry chat-template tokens.
//!
//! Offline evaluation dumps store the full decoded sequence, prompt template
//! included. Each model family wraps the generated turn differently, so the
//! family is looked up from the model name and its markers carve out the answer.

/// Chat-template markers for one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFamily {
    /// Lower-case substring identifying the family in a model name.
    pub pattern: &'static str,
    /// Marker preceding the generated turn.
    pub start_marker: &'static str,
    /// End-of-turn marker removed from the extracted text.
    pub end_marker: &'static str,
}

/// Known families, matched in order; the first hit wins.
pub const MODEL_FAMILIES: &[ModelFamily] = &[
    ModelFamily {
        pattern: "deepseek_r1",
        start_marker: "<｜Assistant｜><think>\n",
        end_marker: "<｜end▁of▁sentence｜>",
    },
    ModelFamily {
        pattern: "qwen2.5",
        start_marker: "<|im_start|>assistant\n",
        end_marker: "<|im_end|>",
    },
    ModelFamily {
        pattern: "llama3.2",
        start_marker: "assistant<|end_header_id|>\n\n",
        end_marker: "<|eot_id|>",
    },
    ModelFamily {
        pattern: "gemma2",
        start_marker: "<start_of_turn>model\n",
        end_marker: "<end_of_turn><eos>",
    },
    ModelFamily {
        pattern: "phi3.5",
        start_marker: " <|end|><|assistant|> ",
        end_marker: "<|end|>",
    },
];

/// Start marker tried when the model name matches no known family.
pub const FALLBACK_START_MARKER: &str = "<start_of_turn>model\n";

/// End markers stripped, in order, after a fallback extraction.
const FALLBACK_END_MARKERS: &[&str] = &["\n<end_of_turn>", "<end_of_turn>"];

/// Find the family whose pattern occurs in `model_name` (case-insensitive).
pub fn detect_family(model_name: &str) -> Option<&'static ModelFamily> {
    let lower = model_name.to_lowercase();
    MODEL_FAMILIES.iter().find(|f| lower.contains(f.pattern))
}

/// Extract the substantive answer from `raw` for the given model.
///
/// Never fails: an unknown family without the fallback marker yields `""`.
pub fn extract_response(raw: &str, model_name: &str) -> String {
    let extracted = match detect_family(model_name) {
        Some(family) => after_last(raw, family.start_marker).replace(family.end_marker, ""),
        None if raw.contains(FALLBACK_START_MARKER) => FALLBACK_END_MARKERS
            .iter()
            .fold(after_last(raw, FALLBACK_START_MARKER).to_string(), |acc, m| {
                acc.replace(m, "")
            }),
        None => String::new(),
    };
    extracted.trim().to_string()
}

/// Text after the last occurrence of `marker`, or all of `text` if absent.
fn after_last<'a>(text: &'a str, marker: &str) -> &'a str {
    match text.rfind(marker) {
        Some(pos) => &text[pos + marker.len()..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_family_case_insensitive() {
        assert_eq!(
            detect_family("Qwen2.5_1.5B_drone_q4").map(|f| f.pattern),
            Some("qwen2.5")
        );
        assert_eq!(
            detect_family("LLAMA3.2_3b_instruct_after").map(|f| f.pattern),
            Some("llama3.2")
        );
        assert!(detect_family("mistral-7b").is_none());
    }

    #[test]
    fn test_detect_family_first_match_wins() {
        // Distilled deepseek models also mention qwen2.5; deepseek is listed first.
        let family = detect_family("deepseek_r1_qwen2.5_1.5b").unwrap();
        assert_eq!(family.pattern, "deepseek_r1");
    }

    #[test]
    fn test_extract_qwen() {
        let raw = "<|im_start|>user\nTake off<|im_end|>\n<|im_start|>assistant\ntakeoff()<|im_end|>";
        assert_eq!(extract_response(raw, "qwen2.5_0.5b_before"), "takeoff()");
    }

    #[test]
    fn test_extract_uses_last_marker() {
        let raw = "<|im_start|>assistant\nfirst<|im_end|><|im_start|>assistant\n second <|im_end|>";
        assert_eq!(extract_response(raw, "qwen2.5"), "second");
    }

    #[test]
    fn test_extract_llama() {
        let raw = "<|start_header_id|>user<|end_header_id|>\n\nland<|eot_id|>\
                   <|start_header_id|>assistant<|end_header_id|>\n\nland()<|eot_id|>";
        assert_eq!(extract_response(raw, "llama3.2_1b"), "land()");
    }

    #[test]
    fn test_extract_gemma() {
        let raw = "<start_of_turn>user\nhover<end_of_turn>\n<start_of_turn>model\nhover(5)<end_of_turn><eos>";
        assert_eq!(extract_response(raw, "gemma2-2b"), "hover(5)");
    }

    #[test]
    fn test_extract_phi() {
        let raw = "<|user|> go up <|end|><|assistant|> ascend(3)<|end|>";
        assert_eq!(extract_response(raw, "phi3.5-mini"), "ascend(3)");
    }

    #[test]
    fn test_extract_deepseek() {
        let raw = "<｜User｜>land<｜Assistant｜><think>\nland()<｜end▁of▁sentence｜>";
        assert_eq!(extract_response(raw, "deepseek_r1_1.5b"), "land()");
    }

    #[test]
    fn test_extract_known_family_without_marker_keeps_text() {
        assert_eq!(extract_response("  takeoff()  ", "qwen2.5"), "takeoff()");
    }

    #[test]
    fn test_extract_fallback_marker() {
        let raw = "<start_of_turn>user\nx<end_of_turn>\n<start_of_turn>model\nland()\n<end_of_turn>";
        assert_eq!(extract_response(raw, "custom-model"), "land()");
    }

    #[test]
    fn test_extract_unknown_without_fallback_is_empty() {
        assert_eq!(extract_response("takeoff()", "custom-model"), "");
        assert_eq!(extract_response("", ""), "");
    }
}
