//! Query handling and action dispatch.
//!
//! query → resolve prompt → Gemini → (speech) → (conversation log) → items

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::actions;
use crate::config::Settings;
use crate::conversation::{self, Exchange};
use crate::diff::{self, SequenceMatcher};
use crate::error::Result;
use crate::gemini::{ChatModel, GeminiClient};
use crate::notifier::Notifier;
use crate::prompt;
use crate::rpc::{Action, ResultItem};
use crate::templates::{TemplateTable, TEMPLATE_FILE};
use crate::tts::{self, KokoroSynthesizer, SpeechSynthesizer, AUDIO_FILE};

pub struct Plugin<M, S> {
    settings: Settings,
    plugin_dir: PathBuf,
    templates: Option<TemplateTable>,
    model: M,
    tts: Option<S>,
    notifier: Notifier,
}

impl Plugin<GeminiClient, KokoroSynthesizer> {
    /// Build the production plugin. A missing template file is reported
    /// per query, not here.
    pub fn from_settings(settings: Settings, plugin_dir: PathBuf) -> Result<Self> {
        let templates = match TemplateTable::load(&plugin_dir.join(TEMPLATE_FILE)) {
            Ok(table) => {
                if table.is_empty() {
                    warn!("{TEMPLATE_FILE} has no prompt rows");
                }
                Some(table)
            }
            Err(e) => {
                error!("{e}");
                None
            }
        };
        let model = GeminiClient::new(&settings)?;
        let tts = settings
            .tts
            .enabled
            .then(|| KokoroSynthesizer::new(&settings.tts, &plugin_dir));

        Ok(Self::new(settings, plugin_dir, templates, model, tts))
    }
}

impl<M, S> Plugin<M, S> {
    pub fn new(
        settings: Settings,
        plugin_dir: PathBuf,
        templates: Option<TemplateTable>,
        model: M,
        tts: Option<S>,
    ) -> Self {
        let notifier = Notifier::new(settings.notifications);
        Self {
            settings,
            plugin_dir,
            templates,
            model,
            tts,
            notifier,
        }
    }

    /// Run a selected item's action. Failures are logged and notified.
    pub fn invoke(&self, action: &Action) {
        info!("Running action {action:?}");
        let result = match action {
            Action::CopyText(text) => actions::copy_text(text).map(|()| Some(("Copied to clipboard", text.as_str()))),
            Action::PlayAudio(path) => tts::play_file(path).map(|()| None),
            Action::OpenPath(path) => actions::open_path(path).map(|()| None),
            Action::OpenText(text) => actions::write_scratch(&self.plugin_dir, text)
                .and_then(|path| actions::open_path(&path))
                .map(|()| None),
        };

        match result {
            Ok(Some((summary, body))) => self.notifier.notify(summary, body),
            Ok(None) => {}
            Err(e) => {
                error!("Action failed: {e}");
                self.notifier.notify("Gemini plugin error", &e.to_string());
            }
        }
    }
}

impl<M, S> Plugin<M, S>
where
    M: ChatModel,
    S: SpeechSynthesizer + Send + 'static,
{
    pub async fn query(&mut self, query: &str) -> Vec<ResultItem> {
        if self.settings.api_key.trim().is_empty() {
            return vec![ResultItem::new(
                "Unable to load the API key",
                "Please make sure you've added a valid API key in the settings",
            )];
        }

        let Some(templates) = &self.templates else {
            return vec![ResultItem::new(
                "Unable to load the system prompts from CSV",
                format!("Please validate that the plugin folder contains a valid {TEMPLATE_FILE}"),
            )
            .with_action(Action::OpenPath(self.plugin_dir.clone()))];
        };

        let stop = self.settings.prompt_stop.as_str();
        if !query.ends_with(stop) {
            return vec![ResultItem::new(
                format!("Type your prompt and end with {stop}"),
                format!("Current model: {}", self.settings.model),
            )];
        }

        let resolved = prompt::resolve(query, stop, templates.rows(), &self.settings.default_prompt);
        let prompt_time = Local::now();

        let answer = match self.model.complete(&resolved.system_message, &resolved.prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Gemini API error: {e}");
                return vec![ResultItem::new("Gemini API Error", e.to_string())];
            }
        };
        let answer_time = Local::now();
        debug!(
            "Answer similarity to query: {:.2}",
            SequenceMatcher::new(query, &answer).ratio()
        );

        let mut items = vec![ResultItem::new(answer.as_str(), diff::align(query, &answer))
            .with_action(Action::CopyText(answer.clone()))];

        if let Some(path) = self.speak(&answer).await {
            items.push(ResultItem::new("🔊", "Play the answer aloud").with_action(Action::PlayAudio(path)));
        }

        let saved = if self.settings.save_conversation {
            let exchange = Exchange {
                keyword: &resolved.keyword,
                prompt: &resolved.prompt,
                prompt_time,
                answer: &answer,
                answer_time,
            };
            conversation::save(&self.plugin_dir, &exchange)
        } else {
            None
        };

        items.push(match saved {
            Some(path) => ResultItem::new("Open conversation", path.display().to_string())
                .with_action(Action::OpenPath(path)),
            None => ResultItem::new("Open answer in editor", actions::ellipsis(&answer, 60))
                .with_action(Action::OpenText(answer)),
        });

        items
    }

    /// Synthesize the answer to the audio file. `None` if disabled or failed.
    async fn speak(&mut self, text: &str) -> Option<PathBuf> {
        let mut tts = self.tts.take()?;
        let path = self.plugin_dir.join(AUDIO_FILE);
        let limit = Duration::from_secs(self.settings.tts.timeout_secs);

        let task = tokio::task::spawn_blocking({
            let text = text.to_string();
            let path = path.clone();
            move || {
                let result = tts.synthesize(&text, &path);
                (tts, result)
            }
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok((tts, result))) => {
                self.tts = Some(tts);
                match result {
                    Ok(()) => Some(path),
                    Err(e) => {
                        error!("TTS Generation Error: {e}");
                        None
                    }
                }
            }
            Ok(Err(e)) => {
                error!("TTS task failed: {e}");
                None
            }
            Err(_) => {
                warn!("TTS timed out after {}s, skipping audio", limit.as_secs());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::templates::PromptTemplate;
    use std::path::Path;
    use std::sync::Mutex;

    struct FakeModel {
        reply: std::result::Result<String, String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeModel {
        fn answering(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatModel for FakeModel {
        async fn complete(&self, system_message: &str, prompt: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system_message.to_string(), prompt.to_string()));
            self.reply.clone().map_err(PluginError::Llm)
        }
    }

    enum FakeTts {
        Writes,
        Fails,
        Hangs,
    }

    impl SpeechSynthesizer for FakeTts {
        fn synthesize(&mut self, text: &str, out_path: &Path) -> Result<()> {
            match self {
                Self::Writes => std::fs::write(out_path, text).map_err(|e| PluginError::io(out_path, e)),
                Self::Fails => Err(PluginError::Tts("engine missing".into())),
                Self::Hangs => {
                    std::thread::sleep(Duration::from_secs(2));
                    Ok(())
                }
            }
        }
    }

    fn settings() -> Settings {
        Settings {
            api_key: "key".into(),
            prompt_stop: "##".into(),
            default_prompt: "default".into(),
            notifications: false,
            ..Settings::default()
        }
    }

    fn templates() -> Option<TemplateTable> {
        Some(TemplateTable::from_rows(vec![
            PromptTemplate::new("default", "You are helpful."),
            PromptTemplate::new("hello", "Be nice"),
        ]))
    }

    fn plugin(
        settings: Settings,
        dir: &Path,
        model: FakeModel,
        tts: Option<FakeTts>,
    ) -> Plugin<FakeModel, FakeTts> {
        Plugin::new(settings, dir.to_path_buf(), templates(), model, tts)
    }

    #[tokio::test]
    async fn missing_api_key_stops_the_query() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            api_key: String::new(),
            ..settings()
        };
        let mut p = plugin(settings, dir.path(), FakeModel::answering("x"), None);

        let items = p.query("hello there##").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Unable to load the API key");
        assert!(p.model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_templates_offer_to_open_plugin_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut p: Plugin<FakeModel, FakeTts> =
            Plugin::new(settings(), dir.path().to_path_buf(), None, FakeModel::answering("x"), None);

        let items = p.query("hello there##").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Unable to load the system prompts from CSV");
        assert_eq!(items[0].action, Some(Action::OpenPath(dir.path().to_path_buf())));
    }

    #[tokio::test]
    async fn unterminated_query_shows_hint() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = plugin(settings(), dir.path(), FakeModel::answering("x"), None);

        let items = p.query("hello there").await;
        assert_eq!(
            items,
            vec![ResultItem::new(
                "Type your prompt and end with ##",
                "Current model: gemini-2.0-flash"
            )]
        );
    }

    #[tokio::test]
    async fn model_error_becomes_error_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = plugin(settings(), dir.path(), FakeModel::failing("quota exceeded"), Some(FakeTts::Writes));

        let items = p.query("hello there##").await;
        assert_eq!(items, vec![ResultItem::new("Gemini API Error", "quota exceeded")]);
        assert!(!dir.path().join(AUDIO_FILE).exists());
    }

    #[tokio::test]
    async fn answer_comes_with_diff_audio_and_editor_items() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = plugin(settings(), dir.path(), FakeModel::answering("Hi there!"), Some(FakeTts::Writes));

        let items = p.query("hello there##").await;

        assert_eq!(
            p.model.calls.lock().unwrap().as_slice(),
            &[("Be nice".to_string(), "there".to_string())]
        );

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Hi there!");
        assert_eq!(items[0].subtitle, diff::align("hello there##", "Hi there!"));
        assert_eq!(items[0].action, Some(Action::CopyText("Hi there!".into())));

        let audio = dir.path().join(AUDIO_FILE);
        assert_eq!(items[1].action, Some(Action::PlayAudio(audio.clone())));
        assert_eq!(std::fs::read_to_string(audio).unwrap(), "Hi there!");

        assert_eq!(items[2].action, Some(Action::OpenText("Hi there!".into())));
    }

    #[tokio::test]
    async fn unknown_keyword_uses_default_persona_and_full_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = plugin(settings(), dir.path(), FakeModel::answering("42"), None);

        p.query("what is the answer##").await;
        assert_eq!(
            p.model.calls.lock().unwrap().as_slice(),
            &[("You are helpful.".to_string(), "what is the answer".to_string())]
        );
    }

    #[tokio::test]
    async fn speech_failure_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = plugin(settings(), dir.path(), FakeModel::answering("ok"), Some(FakeTts::Fails));

        let items = p.query("hello##").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "ok");
        assert!(items.iter().all(|i| !matches!(i.action, Some(Action::PlayAudio(_)))));
    }

    #[tokio::test]
    async fn speech_timeout_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.tts.timeout_secs = 1;
        let mut p = plugin(settings, dir.path(), FakeModel::answering("ok"), Some(FakeTts::Hangs));

        let items = p.query("hello##").await;
        assert_eq!(items.len(), 2);
        assert!(p.tts.is_none());
    }

    #[tokio::test]
    async fn saved_conversation_is_offered_for_opening() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            save_conversation: true,
            ..settings()
        };
        let mut p = plugin(settings, dir.path(), FakeModel::answering("Hi!"), None);

        let items = p.query("hello there##").await;
        let log = conversation::log_path(dir.path(), "hello");
        assert_eq!(items.last().unwrap().action, Some(Action::OpenPath(log.clone())));

        let contents = std::fs::read_to_string(log).unwrap();
        assert!(contents.contains("] User: there\n"));
        assert!(contents.contains("] Gemini: Hi!\n\n"));
    }

    #[test]
    fn failed_action_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let p = plugin(settings(), dir.path(), FakeModel::answering("x"), None);
        p.invoke(&Action::OpenPath(dir.path().join("missing.txt")));
        p.invoke(&Action::PlayAudio(dir.path().join("missing.wav")));
    }
}
