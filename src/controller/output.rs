//! Playback verbs
//!
//! The `play` family converts heterogeneous items (audio paths, numbers,
//! dates, times, pre-built documents) into speech documents, and the
//! interruptible variants race playback against digit collection.

use crate::call::RaceOutcome;
use crate::command::{
    Command, CommandFailure, CommandHandle, CommandKind, CommandOptions, CommandState,
    CompletionReason, OutputDocument,
};
use crate::controller::{failure_to_error, finish_output, CallController};
use crate::error::{EngineError, Result};
use crate::speech::{Document, Grammar};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::{self, Write};
use url::Url;

/// Digits a DTMF interruption grammar may accept
pub const DTMF_DIGITS: &str = "0123456789#*";

/// One playable item
#[derive(Debug, Clone, PartialEq)]
pub enum PlayItem {
    /// Audio file path or URL
    Audio(String),
    /// Spoken as a cardinal number
    Number(i64),
    /// Numeric strings are spoken as cardinals; anything else is treated as
    /// an audio file reference
    Text(String),
    /// A point in time, spoken with optional markup format and an optional
    /// strftime pattern controlling the rendered text
    Time {
        value: DateTime<Utc>,
        format: Option<String>,
        strftime: Option<String>,
    },
    /// A calendar date, same rendering controls as `Time`
    Date {
        value: NaiveDate,
        format: Option<String>,
        strftime: Option<String>,
    },
    /// A pre-built document, passed through unmodified
    Document(Document),
}

impl PlayItem {
    /// Convert to the document fragment this item plays as
    pub fn to_document(&self) -> Result<Document> {
        match self {
            PlayItem::Audio(src) => Ok(Document::audio(src.clone())),
            PlayItem::Number(value) => Ok(Document::cardinal(*value)),
            PlayItem::Text(text) => {
                let trimmed = text.trim();
                if trimmed.parse::<f64>().is_ok() {
                    Ok(Document::cardinal(trimmed))
                } else if is_dtmf_characters(trimmed) {
                    Ok(Document::characters(trimmed))
                } else {
                    Ok(Document::audio(text.clone()))
                }
            }
            PlayItem::Time {
                value,
                format,
                strftime,
            } => {
                let text = match strftime {
                    Some(pattern) => render_strftime(pattern, value.format(pattern))?,
                    None => value.to_rfc3339(),
                };
                Ok(Document::datetime(text, "time", format.clone()))
            }
            PlayItem::Date {
                value,
                format,
                strftime,
            } => {
                let text = match strftime {
                    Some(pattern) => render_strftime(pattern, value.format(pattern))?,
                    None => value.format("%Y-%m-%d").to_string(),
                };
                Ok(Document::datetime(text, "date", format.clone()))
            }
            PlayItem::Document(document) => Ok(document.clone()),
        }
    }
}

impl From<&str> for PlayItem {
    fn from(text: &str) -> Self {
        PlayItem::Text(text.to_string())
    }
}

impl From<String> for PlayItem {
    fn from(text: String) -> Self {
        PlayItem::Text(text)
    }
}

impl From<i64> for PlayItem {
    fn from(value: i64) -> Self {
        PlayItem::Number(value)
    }
}

impl From<Document> for PlayItem {
    fn from(document: Document) -> Self {
        PlayItem::Document(document)
    }
}

/// Render a strftime pattern against a value, fallibly
///
/// Catches both malformed patterns and well-formed patterns whose
/// specifiers the value cannot satisfy (a time-of-day specifier against a
/// bare date); chrono only surfaces the latter at render time.
fn render_strftime(pattern: &str, rendered: impl fmt::Display) -> Result<String> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(EngineError::InvalidArgument(format!(
            "invalid strftime pattern: {pattern}"
        )));
    }
    let mut out = String::new();
    write!(out, "{rendered}").map_err(|_| {
        EngineError::InvalidArgument(format!(
            "strftime pattern does not apply to this value: {pattern}"
        ))
    })?;
    Ok(out)
}

/// DTMF key sequence: digits with `#`/`*` terminators, spelled out
/// character by character rather than treated as an audio path
fn is_dtmf_characters(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c == '#' || c == '*')
}

/// Combine items into one document; any conversion failure aborts the whole
/// batch before anything plays
fn combine_items(items: Vec<PlayItem>) -> Result<Document> {
    let documents = items
        .iter()
        .map(PlayItem::to_document)
        .collect::<Result<Vec<_>>>()?;
    Ok(Document::combine(documents))
}

impl CallController {
    /// Play a sequence of items as one output and wait for it to finish
    ///
    /// No items (or only empty documents) is a no-op.
    pub async fn play(&mut self, items: impl IntoIterator<Item = PlayItem>) -> Result<()> {
        match self.play_async(items).await? {
            Some(mut handle) => finish_output(handle.await_terminal().await),
            None => Ok(()),
        }
    }

    /// Fire-and-forget form of [`play`](Self::play); `None` when there was
    /// nothing to play
    pub async fn play_async(
        &mut self,
        items: impl IntoIterator<Item = PlayItem>,
    ) -> Result<Option<CommandHandle>> {
        let document = combine_items(items.into_iter().collect())?;
        if document.is_empty() {
            return Ok(None);
        }
        let options = self.resolve_options(&Default::default());
        let handle = self.execute_output_async(document, options).await?;
        Ok(Some(handle))
    }

    /// Play a single audio file or URL
    pub async fn play_audio(&mut self, src: impl Into<String>) -> Result<()> {
        self.play([PlayItem::Audio(src.into())]).await
    }

    /// Play an audio file, speaking the fallback text if the file cannot be
    /// rendered
    pub async fn play_audio_with_fallback(
        &mut self,
        src: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Result<()> {
        self.play([PlayItem::Document(Document::audio_with_fallback(
            src, fallback,
        ))])
        .await
    }

    /// Speak a number as a cardinal; anything that does not parse as a
    /// number is rejected
    pub async fn play_numeric(&mut self, value: impl ToString) -> Result<()> {
        let text = value.to_string();
        if text.trim().parse::<f64>().is_err() {
            return Err(EngineError::InvalidArgument(format!(
                "not a number: {text}"
            )));
        }
        self.play([PlayItem::Text(text)]).await
    }

    /// Speak a point in time
    pub async fn play_time(
        &mut self,
        value: DateTime<Utc>,
        format: Option<String>,
        strftime: Option<String>,
    ) -> Result<()> {
        self.play([PlayItem::Time {
            value,
            format,
            strftime,
        }])
        .await
    }

    /// Speak a calendar date
    pub async fn play_date(
        &mut self,
        value: NaiveDate,
        format: Option<String>,
        strftime: Option<String>,
    ) -> Result<()> {
        self.play([PlayItem::Date {
            value,
            format,
            strftime,
        }])
        .await
    }

    /// Render a pre-rendered document by reference; the reference must be a
    /// valid URL
    pub async fn play_document(&mut self, url: &str) -> Result<()> {
        Url::parse(url)
            .map_err(|e| EngineError::InvalidArgument(format!("invalid document url: {e}")))?;
        let state = self
            .call()
            .execute(Command::new(
                CommandKind::Output {
                    document: OutputDocument::Reference(url.to_string()),
                },
                self.resolve_options(&Default::default()),
            ))
            .await?;
        finish_output(state)
    }

    /// Play items one at a time, each interruptible by any DTMF digit;
    /// returns the first digit pressed, or `None` if everything played out
    pub async fn interruptible_play(
        &mut self,
        items: impl IntoIterator<Item = PlayItem>,
    ) -> Result<Option<char>> {
        for item in items {
            if let Some(digit) = self.stream_file(item, DTMF_DIGITS).await? {
                return Ok(Some(digit));
            }
        }
        Ok(None)
    }

    /// Play one item while listening for a digit from `allowed_digits`
    ///
    /// Listening begins before playback starts, so a digit pressed during
    /// command setup is not lost. A digit match stops the playback and is
    /// returned; playback running to its end stops the listener and returns
    /// `None`. Playback failure is fatal.
    pub async fn stream_file(
        &mut self,
        item: impl Into<PlayItem>,
        allowed_digits: &str,
    ) -> Result<Option<char>> {
        if allowed_digits.is_empty() || allowed_digits.chars().any(|d| !DTMF_DIGITS.contains(d)) {
            return Err(EngineError::InvalidArgument(format!(
                "allowed digits must be drawn from {DTMF_DIGITS:?}, got {allowed_digits:?}"
            )));
        }

        let document = item.into().to_document()?;
        if document.is_empty() {
            return Ok(None);
        }

        let output = Command::new(
            CommandKind::Output {
                document: OutputDocument::Inline(document),
            },
            self.resolve_options(&Default::default()),
        );
        let input = Command::new(
            CommandKind::Input {
                grammar: Grammar::dtmf_digits(allowed_digits),
            },
            CommandOptions::default(),
        );

        match self.call().race_output_input(output, input).await? {
            RaceOutcome::InputWon(state) => match state {
                CommandState::Complete(CompletionReason::Match(digit)) => Ok(Some(digit)),
                CommandState::Error(failure) => Err(failure_to_error(failure)),
                _ => Ok(None),
            },
            RaceOutcome::OutputDone { output, input } => {
                // The listener may have matched in the same instant the
                // playback finished; honor that digit before stopping it.
                let digit = match input.state() {
                    CommandState::Complete(CompletionReason::Match(digit)) => Some(digit),
                    _ => {
                        self.call().stop(input.correlation_id().clone());
                        None
                    }
                };
                match output {
                    CommandState::Error(failure) => Err(failure_to_error(failure)),
                    _ => Ok(digit),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{controller, sent_document};
    use crate::transport::{LoopbackTransport, ProtocolEventKind, ScriptedEvent};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_play_nothing_is_a_noop() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        controller.play([]).await.unwrap();
        controller.play([PlayItem::Document(Document::new())]).await.unwrap();

        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_numeric_string_plays_like_a_number() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        controller.play([PlayItem::from(123)]).await.unwrap();
        controller.play([PlayItem::from("123")]).await.unwrap();

        assert_eq!(sent_document(&transport, 0), sent_document(&transport, 1));
        assert_eq!(sent_document(&transport, 0), Document::cardinal(123));
    }

    #[tokio::test]
    async fn test_digit_string_with_terminator_is_spelled_out() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        controller.play([PlayItem::from("123#")]).await.unwrap();
        controller.play([PlayItem::from("*91")]).await.unwrap();

        assert_eq!(sent_document(&transport, 0), Document::characters("123#"));
        assert_eq!(sent_document(&transport, 1), Document::characters("*91"));
    }

    #[tokio::test]
    async fn test_play_audio_with_fallback_text() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        controller
            .play_audio_with_fallback("/sounds/hi.wav", "hello there")
            .await
            .unwrap();

        assert_eq!(
            sent_document(&transport, 0),
            Document::audio_with_fallback("/sounds/hi.wav", "hello there")
        );
    }

    #[tokio::test]
    async fn test_non_numeric_string_plays_as_audio_file() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        controller.play([PlayItem::from("/sounds/hi.wav")]).await.unwrap();

        assert_eq!(sent_document(&transport, 0), Document::audio("/sounds/hi.wav"));
    }

    #[tokio::test]
    async fn test_mixed_items_combine_into_one_output() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        controller
            .play([
                PlayItem::from("/sounds/hi.wav"),
                PlayItem::from(5),
                PlayItem::from("welcome aboard".to_string()),
            ])
            .await
            .unwrap();

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(sent_document(&transport, 0).fragments().len(), 3);
    }

    #[tokio::test]
    async fn test_conversion_failure_aborts_before_any_playback() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let result = controller
            .play([
                PlayItem::from("/sounds/hi.wav"),
                PlayItem::Time {
                    value: Utc::now(),
                    format: None,
                    strftime: Some("%Q bogus".to_string()),
                },
            ])
            .await;

        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_play_numeric_rejects_non_numbers() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let result = controller.play_numeric("twelve").await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert!(transport.sent().is_empty());

        controller.play_numeric(12).await.unwrap();
        assert_eq!(sent_document(&transport, 0), Document::cardinal(12));
    }

    #[tokio::test]
    async fn test_play_time_with_strftime_and_markup_format() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let value = Utc.with_ymd_and_hms(2011, 1, 23, 16, 30, 0).unwrap();
        controller
            .play_time(
                value,
                Some("h:m".to_string()),
                Some("%H:%M".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(
            sent_document(&transport, 0),
            Document::datetime("16:30", "time", Some("h:m".to_string()))
        );
    }

    #[tokio::test]
    async fn test_play_date_with_strftime() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let value = NaiveDate::from_ymd_opt(2011, 1, 23).unwrap();
        controller
            .play_date(value, None, Some("%d/%m/%Y".to_string()))
            .await
            .unwrap();

        assert_eq!(
            sent_document(&transport, 0),
            Document::datetime("23/01/2011", "date", None)
        );
    }

    #[test]
    fn test_date_rejects_time_of_day_pattern_without_panicking() {
        // "%H:%M" is a well-formed pattern, but a bare date has no time
        // fields to render it with.
        let item = PlayItem::Date {
            value: NaiveDate::from_ymd_opt(2011, 1, 23).unwrap(),
            format: None,
            strftime: Some("%H:%M".to_string()),
        };
        assert!(matches!(
            item.to_document(),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_play_date_with_inapplicable_pattern_fails_cleanly() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let value = NaiveDate::from_ymd_opt(2011, 1, 23).unwrap();
        let result = controller
            .play_date(value, None, Some("%H:%M".to_string()))
            .await;

        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert!(transport.sent().is_empty());
        // The verb failed but the call survived.
        assert!(controller.call().state().is_live());
    }

    #[tokio::test]
    async fn test_date_format_attribute_is_independent_of_strftime() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);
        let value = NaiveDate::from_ymd_opt(2011, 1, 23).unwrap();

        controller
            .play_date(value, Some("d-m-y".to_string()), None)
            .await
            .unwrap();
        controller
            .play_date(
                value,
                Some("d-m-y".to_string()),
                Some("%d-%m-%Y".to_string()),
            )
            .await
            .unwrap();

        // Both select the date interpretation and carry the markup format;
        // strftime changes only the rendered text.
        assert_eq!(
            sent_document(&transport, 0),
            Document::datetime("2011-01-23", "date", Some("d-m-y".to_string()))
        );
        assert_eq!(
            sent_document(&transport, 1),
            Document::datetime("23-01-2011", "date", Some("d-m-y".to_string()))
        );
    }

    #[tokio::test]
    async fn test_play_document_requires_a_valid_url() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let result = controller.play_document("not a url").await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert!(transport.sent().is_empty());

        controller
            .play_document("http://example.com/doc.ssml")
            .await
            .unwrap();
        assert!(matches!(
            &transport.sent()[0].command.kind,
            CommandKind::Output {
                document: OutputDocument::Reference(url)
            } if url == "http://example.com/doc.ssml"
        ));
    }

    #[tokio::test]
    async fn test_stream_file_rejects_digits_outside_the_dtmf_set() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        let result = controller.stream_file("/sounds/menu.wav", "12x").await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stream_file_returns_matched_digit_and_stops_playback() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        transport.script_input(vec![ScriptedEvent::after(
            Duration::from_millis(10),
            ProtocolEventKind::Complete(CompletionReason::Match('5')),
        )]);
        transport.script_output(vec![ScriptedEvent::after(
            Duration::from_millis(500),
            ProtocolEventKind::Complete(CompletionReason::Finished),
        )]);

        let digit = controller.stream_file("/sounds/menu.wav", "35").await.unwrap();

        assert_eq!(digit, Some('5'));
        assert_eq!(transport.stops().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_file_without_input_stops_listener_and_returns_none() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        transport.script_input(vec![]);
        transport.script_output(vec![ScriptedEvent::after(
            Duration::from_millis(10),
            ProtocolEventKind::Complete(CompletionReason::Finished),
        )]);

        let digit = controller.stream_file("/sounds/menu.wav", "35").await.unwrap();

        assert_eq!(digit, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.stops().len(), 1);
    }

    #[tokio::test]
    async fn test_interruptible_play_stops_at_first_digit() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        transport.script_input(vec![ScriptedEvent::after(
            Duration::from_millis(10),
            ProtocolEventKind::Complete(CompletionReason::Match('1')),
        )]);
        transport.script_output(vec![ScriptedEvent::after(
            Duration::from_millis(500),
            ProtocolEventKind::Complete(CompletionReason::Finished),
        )]);

        let digit = controller
            .interruptible_play([
                PlayItem::from("/sounds/one.wav"),
                PlayItem::from("/sounds/two.wav"),
            ])
            .await
            .unwrap();

        assert_eq!(digit, Some('1'));
        // Only the first item's input and output reached the wire.
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_interruptible_play_plays_everything_when_silent() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        for _ in 0..2 {
            transport.script_input(vec![]);
            transport.script_output(vec![ScriptedEvent::after(
                Duration::from_millis(5),
                ProtocolEventKind::Complete(CompletionReason::Finished),
            )]);
        }

        let digit = controller
            .interruptible_play([
                PlayItem::from("/sounds/one.wav"),
                PlayItem::from("/sounds/two.wav"),
            ])
            .await
            .unwrap();

        assert_eq!(digit, None);
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_interruptible_play_propagates_playback_failure() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut controller = controller(&transport);

        transport.script_input(vec![]);
        transport.script_output(vec![ScriptedEvent::immediate(ProtocolEventKind::Error(
            "file missing".to_string(),
        ))]);

        let result = controller
            .interruptible_play([PlayItem::from("/sounds/broken.wav")])
            .await;

        assert_eq!(result, Err(EngineError::Playback("file missing".to_string())));
    }
}
