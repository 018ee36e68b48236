//! Clip-based operator voice.
//!
//! ```text
//! <voice_root>/hello/*.wav               greeting
//! <voice_root>/sorry/*.wav               apology
//! <voice_root>/dialing/*.wav             "dialing ..."
//! <voice_root>/placed/*.wav              "call placed"
//! <voice_root>/terminated/*.wav          "call terminated"
//! <voice_root>/calling_person/<name>.wav "calling <name>"
//! ```
//!
//! A folder may hold several takes; one is picked at random each time. The
//! headless host has no speaker, so playback is a wait of the clip's length
//! that [`PromptPlayer::stop`] cuts short.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rotary_core::{CancelToken, PhoneError, Prompt, PromptPlayer};
use tracing::{debug, info};

pub struct ClipPrompter {
    root: PathBuf,
    current: Mutex<Option<CancelToken>>,
}

impl ClipPrompter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: Mutex::new(None),
        }
    }

    /// Pick the clip file for `prompt`.
    pub fn resolve(&self, prompt: &Prompt) -> rotary_core::Result<PathBuf> {
        let folder = match prompt {
            Prompt::Greeting => "hello",
            Prompt::Apology => "sorry",
            Prompt::Dialing(_) => "dialing",
            Prompt::Placed => "placed",
            Prompt::Terminated => "terminated",
            Prompt::Calling(name) => {
                let path = self
                    .root
                    .join("calling_person")
                    .join(format!("{}.wav", name.trim().to_lowercase()));
                return if path.is_file() {
                    Ok(path)
                } else {
                    Err(PhoneError::Playback(format!(
                        "no clip for contact {name} at {}",
                        path.display()
                    )))
                };
            }
        };

        let dir = self.root.join(folder);
        let takes = wav_files(&dir);
        takes
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| PhoneError::Playback(format!("no clips in {}", dir.display())))
    }
}

impl ClipPrompter {
    /// Install a fresh playback token, cancelling whatever was playing.
    fn begin(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn play_with(
        &self,
        token: &CancelToken,
        prompt: &Prompt,
        wait: Option<Duration>,
    ) -> rotary_core::Result<()> {
        let clip = self.resolve(prompt)?;
        let length = clip_length(&clip)?;
        if token.is_cancelled() {
            debug!(%prompt, "prompt stopped before playback");
            return Ok(());
        }
        info!(%prompt, clip = %clip.display(), length_ms = length.as_millis() as u64, "playing prompt");

        if let Some(limit) = wait {
            if token.sleep(length.min(limit)) {
                debug!(%prompt, "prompt cut short");
            }
        }
        Ok(())
    }
}

impl PromptPlayer for ClipPrompter {
    fn play(&self, prompt: &Prompt, wait: Option<Duration>) -> rotary_core::Result<()> {
        let token = self.begin();
        self.play_with(&token, prompt, wait)
    }

    fn stop(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }
}

/// Non-hidden `.wav` files in `dir`, sorted. Empty if `dir` is unreadable.
fn wav_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let hidden = p
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'));
            let wav = p
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("wav"));
            !hidden && wav && p.is_file()
        })
        .collect();
    files.sort();
    files
}

fn clip_length(path: &Path) -> rotary_core::Result<Duration> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| PhoneError::Playback(format!("{}: {e}", path.display())))?;
    let rate = reader.spec().sample_rate.max(1);
    let frames = u64::from(reader.duration());
    Ok(Duration::from_millis(frames * 1_000 / u64::from(rate)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn scratch_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("rotary-voice-{}-{name}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        root
    }

    fn write_clip(path: &Path, millis: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(8 * millis) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn picks_only_visible_wav_takes() {
        let root = scratch_root("takes");
        write_clip(&root.join("hello/take1.wav"), 10);
        write_clip(&root.join("hello/.take2.wav"), 10);
        fs::write(root.join("hello/notes.txt"), "not audio").unwrap();

        let prompter = ClipPrompter::new(&root);
        for _ in 0..5 {
            let clip = prompter.resolve(&Prompt::Greeting).unwrap();
            assert_eq!(clip, root.join("hello/take1.wav"));
        }
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn contact_clip_is_looked_up_by_name() {
        let root = scratch_root("contact");
        write_clip(&root.join("calling_person/alice.wav"), 10);

        let prompter = ClipPrompter::new(&root);
        assert_eq!(
            prompter.resolve(&Prompt::Calling("Alice".into())).unwrap(),
            root.join("calling_person/alice.wav")
        );
        assert!(matches!(
            prompter.resolve(&Prompt::Calling("bob".into())),
            Err(PhoneError::Playback(_))
        ));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_folder_is_a_playback_error() {
        let prompter = ClipPrompter::new(scratch_root("empty"));
        assert!(matches!(
            prompter.play(&Prompt::Placed, None),
            Err(PhoneError::Playback(_))
        ));
    }

    #[test]
    fn waited_play_lasts_the_clip_and_stop_cuts_it_short() {
        let root = scratch_root("wait");
        write_clip(&root.join("sorry/long.wav"), 2_000);
        let prompter = Arc::new(ClipPrompter::new(&root));

        let started = Instant::now();
        prompter
            .play(&Prompt::Apology, Some(Duration::from_millis(50)))
            .unwrap();
        let bounded = started.elapsed();
        assert!(bounded >= Duration::from_millis(40));
        assert!(bounded < Duration::from_millis(1_500));

        let stopper = Arc::clone(&prompter);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            stopper.stop();
        });
        let started = Instant::now();
        prompter
            .play(&Prompt::Apology, Some(Duration::from_secs(10)))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(1_500));
        handle.join().unwrap();
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn stop_while_loading_the_clip_is_not_lost() {
        let root = scratch_root("early-stop");
        write_clip(&root.join("dialing/long.wav"), 5_000);
        let prompter = ClipPrompter::new(&root);

        let token = prompter.begin();
        prompter.stop();

        let started = Instant::now();
        prompter
            .play_with(&token, &Prompt::Dialing("123".into()), Some(Duration::from_secs(10)))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        fs::remove_dir_all(&root).ok();
    }
}
