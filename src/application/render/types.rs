//! Value types shared by the render pipeline stages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Device-independent pixels per print point.
pub const PRINT_SCALE: f64 = 96.0 / 72.0;

const CSS_PIXELS_PER_INCH: f64 = 96.0;
const A4_WIDTH_INCHES: f64 = 8.27;
const A4_HEIGHT_INCHES: f64 = 11.69;
const A4_TIMETABLE_FLAG: &str = "printTimetablesAsA4";

/// Renderer props exactly as the browser-side application expects them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderProps(serde_json::Map<String, serde_json::Value>);

impl RenderProps {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// Props stamped with the poster id the renderer reports back for.
    pub fn with_id(&self, id: Uuid) -> Self {
        let mut map = self.0.clone();
        map.insert("id".to_string(), serde_json::Value::String(id.to_string()));
        Self(map)
    }

    pub fn prints_timetables_as_a4(&self) -> bool {
        self.0
            .get(A4_TIMETABLE_FLAG)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.clone())
    }
}

impl TryFrom<serde_json::Value> for RenderProps {
    type Error = RenderError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            other => Err(RenderError::InvalidProps(format!(
                "expected a JSON object, found `{other}`"
            ))),
        }
    }
}

/// Outcome reported by the rendered page through its completion hook.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionSignal {
    Ready { width: f64, height: f64 },
    Failed(String),
}

impl CompletionSignal {
    /// Decode the object the page passes to its completion hook:
    /// `{ "error": message }` or `{ "width": w, "height": h }`. A falsy
    /// `error` (`null`, `false`, `""` or `0`) counts as absent.
    pub fn from_hook_value(value: &serde_json::Value) -> Result<Self, RenderError> {
        if let Some(error) = value.get("error").filter(|error| is_truthy(error)) {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Ok(Self::Failed(message));
        }

        let dimension = |key: &str| value.get(key).and_then(serde_json::Value::as_f64);
        match (dimension("width"), dimension("height")) {
            (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {
                Ok(Self::Ready { width, height })
            }
            _ => Err(RenderError::InvalidSignal(value.to_string())),
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(flag) => *flag,
        serde_json::Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(text) => !text.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Print,
    Screen,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Print => "print",
            MediaType::Screen => "screen",
        }
    }
}

impl TryFrom<&str> for MediaType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "print" => Ok(MediaType::Print),
            "screen" => Ok(MediaType::Screen),
            _ => Err(()),
        }
    }
}

/// Paper geometry handed to the browser's PDF printer. Lengths are inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub print_background: bool,
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
    pub scale: f64,
    pub page_ranges: Option<String>,
}

impl PrintOptions {
    pub fn a4() -> Self {
        Self {
            print_background: true,
            paper_width: A4_WIDTH_INCHES,
            paper_height: A4_HEIGHT_INCHES,
            margin: 0.0,
            scale: 1.0,
            page_ranges: None,
        }
    }

    /// Single page sized to the measured content, scaled to print points.
    pub fn fit_content(width: f64, height: f64) -> Self {
        Self {
            print_background: true,
            paper_width: width * PRINT_SCALE / CSS_PIXELS_PER_INCH,
            paper_height: height * PRINT_SCALE / CSS_PIXELS_PER_INCH,
            margin: 0.0,
            scale: PRINT_SCALE,
            page_ranges: Some("1".to_string()),
        }
    }

    pub fn for_render(props: &RenderProps, width: f64, height: f64) -> Self {
        if props.prints_timetables_as_a4() {
            Self::a4()
        } else {
            Self::fit_content(width, height)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Warning,
    Error,
}

impl ConsoleLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Warning => "warning",
            ConsoleLevel::Error => "error",
        }
    }
}

/// Out-of-band notifications emitted by an open page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Console { level: ConsoleLevel, text: String },
    Crashed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser session is closed")]
    SessionClosed,
    #[error("page operation failed: {0}")]
    Page(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("{0}")]
    Reported(String),
    #[error("page crashed: {0}")]
    Crashed(String),
    #[error("invalid completion signal: {0}")]
    InvalidSignal(String),
    #[error("invalid render props: {0}")]
    InvalidProps(String),
    #[error("failed to print pdf: {0}")]
    Print(String),
    #[error("failed to store pdf: {0}")]
    Artifact(String),
    #[error("failed to upload pdf: {0}")]
    Upload(String),
}

/// Reason a single attempt did not produce a poster.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderFailure {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Render timeout after {0:?}")]
    Timeout(Duration),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
