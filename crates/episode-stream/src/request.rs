use crate::errors::ClientError;

/// Visual style of the generated episode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtStyle {
    #[default]
    Realistic,
    Cartoon,
    Anime,
    Fantasy,
    Scifi,
}

/// Output video resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Resolution {
    #[serde(rename = "480P")]
    P480,
    #[default]
    #[serde(rename = "720P")]
    P720,
    #[serde(rename = "1080P")]
    P1080,
}

/// Server-side pipeline used to produce the episode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Lip-synced video generated in one pass.
    #[default]
    WanLipsync,
    /// Audio and video generated separately, then merged.
    ExternalMerge,
}

/// Body of the streaming generation request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRequest {
    pub story: String,
    /// Selected character record, forwarded as-is.
    pub character: serde_json::Value,
    pub art_style: ArtStyle,
    pub resolution: Resolution,
    pub mode: GenerationMode,
    pub user_id: String,
}

impl EpisodeRequest {
    /// Creates a request with default style, resolution and mode.
    pub fn new(
        story: impl Into<String>,
        character: serde_json::Value,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            story: story.into(),
            character,
            art_style: ArtStyle::default(),
            resolution: Resolution::default(),
            mode: GenerationMode::default(),
            user_id: user_id.into(),
        }
    }

    pub fn art_style(mut self, art_style: ArtStyle) -> Self {
        self.art_style = art_style;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Checks the fields the server requires.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.story.trim().is_empty() {
            return Err(ClientError::Validation("story is required".into()));
        }
        if self.character.is_null() {
            return Err(ClientError::Validation("character is required".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(ClientError::Validation("user_id must not be empty".into()));
        }
        Ok(())
    }
}
