use keel_types::VersionLabel;

/// A named payload file going into a tagged version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Options for [`Scope::tag`](crate::Scope::tag).
///
/// Without an explicit label the patch field of the highest known label is
/// bumped (`0.0.1` for a fresh component).
#[derive(Clone, Debug)]
pub struct TagOptions {
    pub message: String,
    pub label: Option<VersionLabel>,
}

impl TagOptions {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: VersionLabel) -> Self {
        self.label = Some(label);
        self
    }
}

impl Default for TagOptions {
    fn default() -> Self {
        Self::message("tagged")
    }
}
