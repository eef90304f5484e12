//! Splits one answer string into platform-size-bounded segments.
//!
//! Slicing is purely by character count. That is a deliberate simplicity and
//! latency trade-off inherited from the bot's first version, not a quality
//! feature; do not add word or sentence boundary finding here.

const TITLE_PREFIX: &str = "Prompt: ";
const ELLIPSIS: &str = "...";

/// One deliverable message. Ordering within a batch is significant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub title: Option<String>,
    /// "Responding as: {personality}" line, present on every segment.
    pub author: Option<String>,
    pub body: String,
    pub footer: Option<String>,
}

/// Size caps supplied by configuration, not assumed from any platform.
#[derive(Clone, Copy, Debug)]
pub struct ChunkLimits {
    pub body_limit: usize,
    pub title_limit: usize,
}

/// Display metadata resolved by the pipeline after a successful answer.
#[derive(Clone, Debug)]
pub struct ResponseMeta {
    pub model_display: String,
    pub personality: String,
    pub api_call_count: u64,
}

/// Split `answer` into an ordered batch.
///
/// Pure and idempotent: same inputs, same batch. Pacing between segments is
/// the caller's concern.
pub fn split_answer(
    prompt: &str,
    answer: &str,
    limits: ChunkLimits,
    meta: &ResponseMeta,
) -> Vec<Segment> {
    let title = prompt_title(prompt, limits.title_limit);
    let author = format!("Responding as: {}", meta.personality);

    let answer_chars = answer.chars().count();
    if answer_chars <= limits.body_limit {
        return vec![Segment {
            title: Some(title),
            author: Some(author),
            body: answer.to_string(),
            footer: Some(format!(
                "Model: {} | API Call #{}",
                meta.model_display, meta.api_call_count
            )),
        }];
    }

    let bodies = slice_by_chars(answer, limits.body_limit);
    let total = bodies.len();

    bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            if i == 0 {
                Segment {
                    title: Some(title.clone()),
                    author: Some(author.clone()),
                    body,
                    footer: Some(format!(
                        "Model: {} | API Call #{} | Part 1/{total}",
                        meta.model_display, meta.api_call_count
                    )),
                }
            } else {
                Segment {
                    title: Some(format!("Part {}/{total}", i + 1)),
                    author: Some(author.clone()),
                    body,
                    footer: None,
                }
            }
        })
        .collect()
}

/// `"Prompt: " + prompt`, cut to exactly `limit` characters when over.
///
/// The bound is enforced in characters and includes the ellipsis; an earlier
/// version of this bot overflowed the platform cap by a few characters, so
/// boundary lengths are covered by tests below.
fn prompt_title(prompt: &str, limit: usize) -> String {
    let full = format!("{TITLE_PREFIX}{prompt}");
    if full.chars().count() <= limit {
        return full;
    }

    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut cut: String = full.chars().take(keep).collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// Consecutive fixed-size slices of exactly `size` characters; the final
/// slice may be shorter. Char-based so multi-byte text never splits a
/// code point.
fn slice_by_chars(text: &str, size: usize) -> Vec<String> {
    debug_assert!(size > 0);

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ChunkLimits {
        ChunkLimits {
            body_limit: 4096,
            title_limit: 256,
        }
    }

    fn meta() -> ResponseMeta {
        ResponseMeta {
            model_display: "3.0 Flash".to_string(),
            personality: "John Robot".to_string(),
            api_call_count: 7,
        }
    }

    #[test]
    fn short_answer_yields_one_segment() {
        let batch = split_answer("What is 2+2?", "4", limits(), &meta());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].title.as_deref(), Some("Prompt: What is 2+2?"));
        assert_eq!(batch[0].body, "4");
        assert_eq!(
            batch[0].footer.as_deref(),
            Some("Model: 3.0 Flash | API Call #7")
        );
        assert_eq!(
            batch[0].author.as_deref(),
            Some("Responding as: John Robot")
        );
    }

    #[test]
    fn answer_at_exact_limit_stays_single() {
        let answer = "x".repeat(4096);
        let batch = split_answer("q", &answer, limits(), &meta());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body.len(), 4096);
    }

    #[test]
    fn long_answer_splits_into_exact_slices() {
        let answer = "a".repeat(10_000);
        let batch = split_answer("q", &answer, limits(), &meta());

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].body.len(), 4096);
        assert_eq!(batch[1].body.len(), 4096);
        assert_eq!(batch[2].body.len(), 1808);

        assert_eq!(batch[0].title.as_deref(), Some("Prompt: q"));
        assert_eq!(
            batch[0].footer.as_deref(),
            Some("Model: 3.0 Flash | API Call #7 | Part 1/3")
        );
        assert_eq!(batch[1].title.as_deref(), Some("Part 2/3"));
        assert_eq!(batch[2].title.as_deref(), Some("Part 3/3"));
        assert!(batch[1].footer.is_none());
        assert!(batch[2].footer.is_none());
    }

    #[test]
    fn split_bodies_concatenate_back_to_answer() {
        let answer: String = ("abcdefghij".repeat(1000)).chars().take(9999).collect();
        let batch = split_answer("q", &answer, limits(), &meta());

        let rejoined: String = batch.iter().map(|s| s.body.as_str()).collect();
        assert_eq!(rejoined, answer);
    }

    #[test]
    fn multibyte_answer_splits_on_char_boundaries() {
        let answer = "é".repeat(5000);
        let batch = split_answer("q", &answer, limits(), &meta());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body.chars().count(), 4096);
        assert_eq!(batch[1].body.chars().count(), 904);
    }

    #[test]
    fn title_never_exceeds_limit_at_boundaries() {
        // "Prompt: " is 8 chars; a 248-char prompt lands exactly on the cap.
        for prompt_len in [0usize, 200, 247, 248, 249, 250, 256, 300, 2000] {
            let prompt = "p".repeat(prompt_len);
            let batch = split_answer(&prompt, "ok", limits(), &meta());
            let title = batch[0].title.as_deref().unwrap();
            assert!(
                title.chars().count() <= 256,
                "title overflowed at prompt_len={prompt_len}: {}",
                title.chars().count()
            );
        }
    }

    #[test]
    fn title_at_cap_is_untruncated() {
        let prompt = "p".repeat(248);
        let batch = split_answer(&prompt, "ok", limits(), &meta());
        let title = batch[0].title.as_deref().unwrap();
        assert_eq!(title.chars().count(), 256);
        assert!(!title.ends_with("..."));
    }

    #[test]
    fn title_one_over_cap_gets_ellipsis() {
        let prompt = "p".repeat(249);
        let batch = split_answer(&prompt, "ok", limits(), &meta());
        let title = batch[0].title.as_deref().unwrap();
        assert_eq!(title.chars().count(), 256);
        assert!(title.ends_with("..."));
        assert!(title.starts_with("Prompt: "));
    }

    #[test]
    fn chunker_is_idempotent() {
        let answer = "z".repeat(9000);
        let a = split_answer("same", &answer, limits(), &meta());
        let b = split_answer("same", &answer, limits(), &meta());
        assert_eq!(a, b);
    }
}
