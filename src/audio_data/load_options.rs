#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Static gain baked into the converted samples (clamped to the 16-bit range)
    pub volume: f32,
    /// Downmix to mono regardless of the source channel count
    pub convert_to_mono: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            convert_to_mono: false,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn convert_to_mono(mut self, convert: bool) -> Self {
        self.convert_to_mono = convert;
        self
    }
}
