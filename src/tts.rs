//! Speech for answers: Kokoro synthesis to a WAV file, and playback.
//!
//! Pipeline:
//! 1. Text → sentences (split on .!?)
//! 2. Sentence → phonemes (misaki-rs G2P)
//! 3. Phonemes → token IDs (tokenizer.json vocabulary)
//! 4. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//! 5. All sentences → one 16-bit mono WAV (hound)
//!
//! Playback decodes the file with rodio and blocks until it finishes.

use std::collections::HashMap;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use crate::config::TtsConfig;
use crate::error::{PluginError, Result};

pub const AUDIO_FILE: &str = "output.wav";

const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension

const MODEL_FILE: &str = "kokoro-v1.0.onnx";
const VOICES_FILE: &str = "voices-v1.0.bin";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Turns text into an audio file.
pub trait SpeechSynthesizer {
    fn synthesize(&mut self, text: &str, out_path: &Path) -> Result<()>;
}

/// Native Kokoro TTS engine, loaded lazily on first use.
pub struct KokoroSynthesizer {
    voice: String,
    speed: f32,
    model_dir: PathBuf,
    loaded: Option<LoadedModel>,
}

struct LoadedModel {
    session: ort::session::Session,
    phonemizer: misaki_rs::G2P,
    vocab: HashMap<char, i64>,
    /// Style vectors indexed by token count. shape: (510, 256)
    styles: Array2<f32>,
}

impl KokoroSynthesizer {
    pub fn new(config: &TtsConfig, plugin_dir: &Path) -> Self {
        let model_dir = if config.model_dir.is_empty() {
            plugin_dir.to_path_buf()
        } else {
            PathBuf::from(&config.model_dir)
        };

        Self {
            voice: config.voice.clone(),
            speed: config.speed,
            model_dir,
            loaded: None,
        }
    }

    fn load(&self) -> std::result::Result<LoadedModel, String> {
        let t0 = Instant::now();

        let tokenizer_path = self.model_dir.join(TOKENIZER_FILE);
        debug!("Loading tokenizer from {}", tokenizer_path.display());
        let vocab = load_tokenizer(&tokenizer_path)?;

        let voices_path = self.model_dir.join(VOICES_FILE);
        debug!("Loading voice '{}' from {}", self.voice, voices_path.display());
        let styles = load_voice(&voices_path, &self.voice)?;

        let model_path = self.model_dir.join(MODEL_FILE);
        debug!("Loading ONNX model from {}", model_path.display());
        let session = ort::session::Session::builder()
            .map_err(|e| format!("Failed to create ONNX session builder: {e}"))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| format!("Failed to set optimization level: {e}"))?
            .with_intra_threads(4)
            .map_err(|e| format!("Failed to set thread count: {e}"))?
            .commit_from_file(&model_path)
            .map_err(|e| format!("Failed to load ONNX model: {e}"))?;

        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);

        info!("Kokoro TTS loaded in {}ms", t0.elapsed().as_millis());
        Ok(LoadedModel {
            session,
            phonemizer,
            vocab,
            styles,
        })
    }

    fn render(&mut self, text: &str) -> std::result::Result<Vec<f32>, String> {
        if self.loaded.is_none() {
            self.loaded = Some(self.load()?);
        }
        let speed = self.speed;
        let model = self.loaded.as_mut().ok_or("Model not loaded")?;

        let mut samples = Vec::new();
        for (i, sentence) in split_sentences(text.trim()).iter().enumerate() {
            match model.generate(sentence, speed) {
                Ok(chunk) => samples.extend(chunk),
                Err(e) => warn!("TTS generation failed for sentence {}: {e}", i + 1),
            }
        }
        Ok(samples)
    }
}

impl SpeechSynthesizer for KokoroSynthesizer {
    fn synthesize(&mut self, text: &str, out_path: &Path) -> Result<()> {
        let t0 = Instant::now();
        let samples = self.render(text).map_err(PluginError::Tts)?;
        if samples.is_empty() {
            return Err(PluginError::Tts("No audio generated".into()));
        }

        write_wav(out_path, &samples).map_err(PluginError::Tts)?;
        info!(
            "Synthesized {:.1}s of audio to {} in {}ms",
            samples.len() as f32 / SAMPLE_RATE as f32,
            out_path.display(),
            t0.elapsed().as_millis()
        );
        Ok(())
    }
}

impl LoadedModel {
    /// Generate audio samples for a single sentence.
    fn generate(&mut self, text: &str, speed: f32) -> std::result::Result<Vec<f32>, String> {
        let (phonemes, _tokens) = self
            .phonemizer
            .g2p(text)
            .map_err(|e| format!("Phonemization failed: {e}"))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        let mut token_ids: Vec<i64> = Vec::with_capacity(phonemes.len() + 2);
        token_ids.push(0);
        token_ids.extend(phonemes.chars().filter_map(|ch| self.vocab.get(&ch).copied()));
        token_ids.push(0);

        let n_tokens = token_ids.len().min(MAX_TOKENS);
        token_ids.truncate(n_tokens);

        let style_idx = (n_tokens.saturating_sub(2)).min(self.styles.nrows() - 1);
        let style_vec: Vec<f32> = self.styles.row(style_idx).to_vec();

        let tokens_array = Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| format!("Failed to create tokens tensor: {e}"))?;
        let tokens_tensor = Tensor::from_array(tokens_array)
            .map_err(|e| format!("Failed to create tokens ort tensor: {e}"))?;

        let style_array = Array2::from_shape_vec((1, style_vec.len()), style_vec)
            .map_err(|e| format!("Failed to create style tensor: {e}"))?;
        let style_tensor = Tensor::from_array(style_array)
            .map_err(|e| format!("Failed to create style ort tensor: {e}"))?;

        let speed_tensor = Tensor::from_array(ndarray::Array1::from_vec(vec![speed]))
            .map_err(|e| format!("Failed to create speed ort tensor: {e}"))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| format!("ONNX inference failed: {e}"))?;

        let first_output = outputs.iter().next().ok_or("No output tensor from model")?;
        let (_shape, audio) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("Failed to extract audio tensor: {e}"))?;

        Ok(audio.to_vec())
    }
}

/// Play an audio file on the default output device, blocking until done.
pub fn play_file(path: &Path) -> Result<()> {
    let file = fs::File::open(path).map_err(|e| PluginError::io(path, e))?;

    let stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| PluginError::Audio(format!("Failed to open audio output: {e}")))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| PluginError::Audio(format!("Failed to decode {}: {e}", path.display())))?;

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    sink.sleep_until_end();

    debug!("Played {}", path.display());
    Ok(())
}

// --- Helper functions ---

/// f32 [-1, 1] samples → 16-bit mono WAV.
fn write_wav(path: &Path, samples: &[f32]) -> std::result::Result<(), String> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("Failed to create {}: {e}", path.display()))?;
    for &sample in samples {
        let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(s)
            .map_err(|e| format!("Failed to write sample: {e}"))?;
    }
    writer
        .finalize()
        .map_err(|e| format!("Failed to finalize {}: {e}", path.display()))
}

/// Load tokenizer vocabulary from tokenizer.json.
fn load_tokenizer(path: &Path) -> std::result::Result<HashMap<char, i64>, String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("Failed to read tokenizer: {e}"))?;

    let data: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse tokenizer JSON: {e}"))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or("Missing model.vocab in tokenizer.json")?;

    let mut map = HashMap::new();
    for (token, id) in vocab {
        let id = id.as_i64().ok_or("Token ID is not an integer")?;
        if let Some(ch) = token.chars().next() {
            map.insert(ch, id);
        }
    }

    Ok(map)
}

/// Load one voice's style vectors from the NPZ voices file.
fn load_voice(path: &Path, voice: &str) -> std::result::Result<Array2<f32>, String> {
    let file = fs::File::open(path).map_err(|e| format!("Failed to open voices file: {e}"))?;
    let mut npz = NpzReader::new(file).map_err(|e| format!("Failed to read NPZ voices file: {e}"))?;

    let arr: Array3<f32> = npz
        .by_name(&format!("{voice}.npy"))
        .map_err(|e| format!("Failed to read voice '{voice}': {e}"))?;

    // (510, 1, 256) → (510, 256)
    let dim0 = arr.shape()[0];
    let dim2 = arr.shape()[2];
    arr.into_shape_with_order((dim0, dim2))
        .map_err(|e| format!("Failed to reshape voice '{voice}': {e}"))
}

/// Split text into sentences at .!? boundaries.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?') && i + 1 < bytes.len() && bytes[i + 1].is_ascii_whitespace() {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = i + 1;
        }
    }

    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        assert_eq!(
            split_sentences("Hi there. How are you?  Fine!"),
            vec!["Hi there.", "How are you?", "Fine!"]
        );
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn wav_is_mono_24khz_and_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AUDIO_FILE);
        write_wav(&path, &[0.0, 0.5, 2.0, -2.0]).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, 32767, -32768]);
    }

    #[test]
    fn tokenizer_vocab_maps_first_char() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKENIZER_FILE);
        fs::write(&path, r#"{"model": {"vocab": {"a": 43, "ˈ": 156, "$": 0}}}"#).unwrap();

        let vocab = load_tokenizer(&path).unwrap();
        assert_eq!(vocab.get(&'a'), Some(&43));
        assert_eq!(vocab.get(&'ˈ'), Some(&156));
        assert_eq!(vocab.len(), 3);
    }

    #[test]
    fn missing_model_files_fail_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let config = TtsConfig {
            model_dir: dir.path().display().to_string(),
            ..TtsConfig::default()
        };
        let mut tts = KokoroSynthesizer::new(&config, Path::new("."));
        let result = tts.synthesize("Hello.", &dir.path().join(AUDIO_FILE));
        assert!(matches!(result, Err(PluginError::Tts(_))));
    }

    #[test]
    fn playing_a_missing_file_is_an_io_error() {
        let result = play_file(Path::new("/nonexistent/output.wav"));
        assert!(matches!(result, Err(PluginError::Io { .. })));
    }
}
