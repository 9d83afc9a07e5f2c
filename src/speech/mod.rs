//! Speech document and grammar construction
//!
//! Builds the SSML-style output documents and DTMF grammars that output and
//! input commands carry to the signaling layer. Construction is pure and
//! synchronous; rendering produces the markup string sent over the wire.

use serde::{Deserialize, Serialize};

/// One renderable node of a speech document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    /// Literal text spoken as-is
    Text(String),
    /// Audio file or URL reference, with optional TTS fallback text
    Audio {
        src: String,
        fallback: Option<String>,
    },
    /// Interpreted rendering (cardinal, characters, date, time)
    SayAs {
        interpret_as: String,
        format: Option<String>,
        text: String,
    },
}

impl Fragment {
    fn render(&self, out: &mut String) {
        match self {
            Fragment::Text(text) => out.push_str(&escape_xml(text)),
            Fragment::Audio { src, fallback } => {
                match fallback {
                    Some(text) => {
                        out.push_str(&format!(
                            "<audio src=\"{}\">{}</audio>",
                            escape_xml(src),
                            escape_xml(text)
                        ));
                    }
                    None => out.push_str(&format!("<audio src=\"{}\"/>", escape_xml(src))),
                }
            }
            Fragment::SayAs {
                interpret_as,
                format,
                text,
            } => {
                out.push_str(&format!("<say-as interpret-as=\"{}\"", escape_xml(interpret_as)));
                if let Some(format) = format {
                    out.push_str(&format!(" format=\"{}\"", escape_xml(format)));
                }
                out.push_str(&format!(">{}</say-as>", escape_xml(text)));
            }
        }
    }
}

/// A speech document: an ordered sequence of fragments
///
/// Documents built by application code are passed through to the transport
/// unmodified; the controller never re-wraps an already-built document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    fragments: Vec<Fragment>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal text
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_fragment(Fragment::Text(text.into()))
    }

    /// Cardinal number rendering
    pub fn cardinal(value: impl ToString) -> Self {
        Self::from_fragment(Fragment::SayAs {
            interpret_as: "cardinal".to_string(),
            format: None,
            text: value.to_string(),
        })
    }

    /// Character-by-character rendering
    pub fn characters(value: impl ToString) -> Self {
        Self::from_fragment(Fragment::SayAs {
            interpret_as: "characters".to_string(),
            format: None,
            text: value.to_string(),
        })
    }

    /// Date/time rendering with an optional explicit markup format
    pub fn datetime(
        text: impl Into<String>,
        interpret_as: impl Into<String>,
        format: Option<String>,
    ) -> Self {
        Self::from_fragment(Fragment::SayAs {
            interpret_as: interpret_as.into(),
            format,
            text: text.into(),
        })
    }

    /// Audio reference
    pub fn audio(src: impl Into<String>) -> Self {
        Self::from_fragment(Fragment::Audio {
            src: src.into(),
            fallback: None,
        })
    }

    /// Audio reference with TTS fallback text
    pub fn audio_with_fallback(src: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self::from_fragment(Fragment::Audio {
            src: src.into(),
            fallback: Some(fallback.into()),
        })
    }

    fn from_fragment(fragment: Fragment) -> Self {
        Self {
            fragments: vec![fragment],
        }
    }

    /// Combine several documents into one, in order
    pub fn combine(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut combined = Self::new();
        for document in documents {
            combined.fragments.extend(document.fragments);
        }
        combined
    }

    /// Append a fragment
    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Render to the markup string sent over the wire
    pub fn render(&self) -> String {
        let mut out = String::from("<speak>");
        for fragment in &self.fragments {
            fragment.render(&mut out);
        }
        out.push_str("</speak>");
        out
    }
}

/// A DTMF input grammar: a flat one-of over single digits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    mode: String,
    alternatives: Vec<String>,
}

impl Grammar {
    /// Grammar accepting exactly the listed DTMF digits
    pub fn dtmf_digits(digits: &str) -> Self {
        Self {
            mode: "dtmf".to_string(),
            alternatives: digits.chars().map(|d| d.to_string()).collect(),
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Render to the markup string sent over the wire
    pub fn render(&self) -> String {
        let mut out = format!(
            "<grammar mode=\"{}\" root=\"acceptdigits\"><rule id=\"acceptdigits\"><one-of>",
            escape_xml(&self.mode)
        );
        for alternative in &self.alternatives {
            out.push_str(&format!("<item>{}</item>", escape_xml(alternative)));
        }
        out.push_str("</one-of></rule></grammar>");
        out
    }
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
