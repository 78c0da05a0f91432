//! Static language table mapping canonical locales to the codes each
//! provider wants: recognizer dialect, translate code, and Polly voice.

/// Pivot language for two-hop translation and for unknown inputs.
pub const PIVOT_LANG: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngine {
    Neural,
    Standard,
}

#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub locale: &'static str,
    /// Streaming recognizer dialect code.
    pub asr_code: &'static str,
    /// Translate-dialect code.
    pub mt_code: &'static str,
    /// None = text-only target; captions are delivered but no audio.
    pub tts_voice: Option<&'static str>,
    pub tts_engine: TtsEngine,
}

static LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec { locale: "en-US", asr_code: "en-US", mt_code: "en", tts_voice: Some("Joanna"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "en-GB", asr_code: "en-GB", mt_code: "en", tts_voice: Some("Amy"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "es-US", asr_code: "es-US", mt_code: "es", tts_voice: Some("Lupe"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "es-ES", asr_code: "es-ES", mt_code: "es", tts_voice: Some("Lucia"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "fr-FR", asr_code: "fr-FR", mt_code: "fr", tts_voice: Some("Lea"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "de-DE", asr_code: "de-DE", mt_code: "de", tts_voice: Some("Vicki"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "it-IT", asr_code: "it-IT", mt_code: "it", tts_voice: Some("Bianca"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "pt-BR", asr_code: "pt-BR", mt_code: "pt", tts_voice: Some("Camila"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "nl-NL", asr_code: "nl-NL", mt_code: "nl", tts_voice: Some("Laura"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "hi-IN", asr_code: "hi-IN", mt_code: "hi", tts_voice: Some("Kajal"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "ja-JP", asr_code: "ja-JP", mt_code: "ja", tts_voice: Some("Takumi"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "ko-KR", asr_code: "ko-KR", mt_code: "ko", tts_voice: Some("Seoyeon"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "zh-CN", asr_code: "zh-CN", mt_code: "zh", tts_voice: Some("Zhiyu"), tts_engine: TtsEngine::Neural },
    LanguageSpec { locale: "ar-SA", asr_code: "ar-SA", mt_code: "ar", tts_voice: Some("Zeina"), tts_engine: TtsEngine::Standard },
    // Text-only targets: Translate supports them, Polly has no voice.
    LanguageSpec { locale: "ta-IN", asr_code: "ta-IN", mt_code: "ta", tts_voice: None, tts_engine: TtsEngine::Standard },
    LanguageSpec { locale: "te-IN", asr_code: "te-IN", mt_code: "te", tts_voice: None, tts_engine: TtsEngine::Standard },
];

/// Resolves a canonical locale. Unknown locales resolve to the pivot
/// entry rather than failing, so a bad client value degrades to English.
pub fn resolve(locale: &str) -> &'static LanguageSpec {
    LANGUAGES
        .iter()
        .find(|spec| spec.locale.eq_ignore_ascii_case(locale))
        .unwrap_or(&LANGUAGES[0])
}

/// Translate-dialect code for a canonical locale.
pub fn mt(locale: &str) -> &'static str {
    resolve(locale).mt_code
}

/// Maps a recognizer dialect code back to its translate code. Accepts a
/// bare translate code too, since some recognizers echo those in their
/// results. Unknown inputs yield the pivot.
pub fn mt_from_asr(asr_code: &str) -> &'static str {
    if let Some(spec) = LANGUAGES
        .iter()
        .find(|spec| spec.asr_code.eq_ignore_ascii_case(asr_code))
    {
        return spec.mt_code;
    }
    LANGUAGES
        .iter()
        .find(|spec| spec.mt_code.eq_ignore_ascii_case(asr_code))
        .map(|spec| spec.mt_code)
        .unwrap_or(PIVOT_LANG)
}
