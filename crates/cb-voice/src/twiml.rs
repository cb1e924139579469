//! Minimal TwiML voice response builder

use std::fmt;

/// Content type Twilio expects for TwiML
pub const TWIML_CONTENT_TYPE: &str = "text/xml";

/// TwiML verbs this service emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// End the call
    Hangup,
}

impl Verb {
    fn tag(&self) -> &'static str {
        match self {
            Verb::Hangup => "Hangup",
        }
    }
}

/// `<Response>` document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `<Hangup/>`
    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Render the XML document
    pub fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VoiceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;

        if self.verbs.is_empty() {
            return write!(f, "<Response/>");
        }

        write!(f, "<Response>")?;
        for verb in &self.verbs {
            write!(f, "<{}/>", verb.tag())?;
        }
        write!(f, "</Response>")
    }
}
