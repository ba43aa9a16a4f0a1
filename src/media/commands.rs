use std::path::Path;

use super::{AudioSelection, MediaStream, Mp4Job, RepackJob, StreamKind, normalize_language};
use crate::config::MediaSettings;
use crate::process::ProcessCommand;

/// Builds ffmpeg invocations for every conversion the pipeline needs
#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    settings: MediaSettings,
}

impl FfmpegCommandBuilder {
    pub fn new(settings: MediaSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MediaSettings {
        &self.settings
    }

    fn command<S: Into<String>>(&self, description: S) -> ProcessCommand {
        ProcessCommand::new(&self.settings.binary_path, description)
    }

    /// `ffmpeg -i <file> -hide_banner`; exits non-zero without an output file, which is expected
    pub fn probe(&self, path: &Path) -> ProcessCommand {
        self.command(format!("Probe {}", file_name(path)))
            .input(path)
            .arg("-hide_banner")
            .allow_failure()
    }

    pub fn convert_to_mp4(&self, job: &Mp4Job) -> ProcessCommand {
        let mut cmd = self
            .command(format!("Convert {} to MP4", file_name(&job.media_file)))
            .input(&job.media_file);

        // input 0 is the video; external audio and embedded subtitles follow
        let mut next_input = 1;
        let mut audio_input = None;
        if let AudioSelection::ExternalFile(path) = &job.audio {
            cmd = cmd.input(path);
            audio_input = Some(next_input);
            next_input += 1;
        }
        let mut subtitle_input = None;
        if let Some(path) = job.subtitle_file.as_ref().filter(|_| !job.burn_subtitles) {
            cmd = cmd.input(path);
            subtitle_input = Some(next_input);
        }
        let subtitle_lang = job
            .subtitle_lang
            .as_deref()
            .map(normalize_language)
            .unwrap_or_default();

        cmd = cmd.map("0:v:0");
        match (&job.subtitle_file, job.burn_subtitles) {
            (Some(subtitle), true) => {
                cmd = cmd
                    .video_codec("libx264")
                    .arg("-crf")
                    .arg(&self.settings.encode_crf)
                    .arg("-preset")
                    .arg(&self.settings.encode_preset)
                    .video_filter(format!("subtitles={}", escape_filter_path(subtitle)))
                    .arg("-metadata")
                    .arg(format!("comment=burned-subs-lang:{}", subtitle_lang));
            }
            _ => cmd = cmd.copy_video(),
        }

        cmd = match (&job.audio, audio_input) {
            (AudioSelection::ExternalFile(_), Some(input)) => cmd.map(format!("{}:a:0", input)),
            (AudioSelection::InternalStream(stream), _) => cmd.map(format!("0:{}", stream.index)),
            (AudioSelection::ExternalFile(_), None) => cmd,
        }
        .copy_audio();
        if !job.audio_lang.is_empty() {
            cmd = cmd
                .arg("-metadata:s:a:0")
                .arg(format!("language={}", normalize_language(&job.audio_lang)));
        }

        if let Some(input) = subtitle_input {
            cmd = cmd
                .map(format!("{}:0", input))
                .subtitle_codec("mov_text")
                .arg("-metadata:s:s:0")
                .arg(format!("language={}", subtitle_lang));
        }

        cmd.overwrite().output(&job.output_file)
    }

    pub fn extract_subtitle(&self, media_file: &Path, stream: &MediaStream, lang: &str, output: &Path) -> ProcessCommand {
        self.command(format!("Extract subtitle #{} from {}", stream.index, file_name(media_file)))
            .input(media_file)
            .map(format!("0:{}", stream.index))
            .arg("-metadata:s:s:0")
            .arg(format!("language={}", normalize_language(lang)))
            .overwrite()
            .output(output)
    }

    pub fn convert_subtitle_to_vtt(&self, subtitle_file: &Path, lang: &str, output: &Path) -> ProcessCommand {
        self.command(format!("Convert {} to WebVTT", file_name(subtitle_file)))
            .input(subtitle_file)
            .subtitle_codec("webvtt")
            .arg("-metadata:s:s:0")
            .arg(format!("language={}", normalize_language(lang)))
            .overwrite()
            .output(output)
    }

    pub fn extract_audio(&self, media_file: &Path, stream: &MediaStream, lang: &str, output: &Path) -> ProcessCommand {
        self.command(format!(
            "Extract audio #{} from {} as {}",
            stream.index,
            file_name(media_file),
            self.settings.browser_audio_codec.to_uppercase()
        ))
        .input(media_file)
        .map(format!("0:{}", stream.index))
        .arg("-metadata:s:a:0")
        .arg(format!("language={}", normalize_language(lang)))
        .audio_codec(&self.settings.browser_audio_codec)
        .arg("-b:a")
        .arg(&self.settings.browser_audio_bitrate)
        .overwrite()
        .output(output)
    }

    pub fn convert_audio(&self, audio_file: &Path, lang: &str, output: &Path) -> ProcessCommand {
        self.command(format!(
            "Convert {} to {}",
            file_name(audio_file),
            self.settings.browser_audio_codec.to_uppercase()
        ))
        .input(audio_file)
        .audio_codec(&self.settings.browser_audio_codec)
        .arg("-b:a")
        .arg(&self.settings.browser_audio_bitrate)
        .arg("-metadata:s:a:0")
        .arg(format!("language={}", normalize_language(lang)))
        .overwrite()
        .output(output)
    }

    pub fn set_subtitle_language(&self, subtitle_file: &Path, lang: &str, output: &Path) -> ProcessCommand {
        self.command(format!("Tag {} as {}", file_name(subtitle_file), lang))
            .input(subtitle_file)
            .map("0")
            .arg("-c")
            .arg("copy")
            .arg("-metadata:s:s:0")
            .arg(format!("language={}", normalize_language(lang)))
            .overwrite()
            .output(output)
    }

    /// Keep the first video stream plus the selected streams, copying everything
    pub fn repack(&self, job: &RepackJob) -> ProcessCommand {
        let mut cmd = self
            .command(format!("Repack {}", file_name(&job.media_file)))
            .input(&job.media_file)
            .map("0:v:0");
        for stream in &job.streams {
            cmd = cmd.map(format!("0:{}", stream.index));
        }
        cmd = cmd.arg("-c").arg("copy");

        let mut audio_out = 0;
        let mut subtitle_out = 0;
        for stream in &job.streams {
            let (specifier, position) = match stream.kind {
                StreamKind::Audio => ("a", &mut audio_out),
                StreamKind::Subtitle => ("s", &mut subtitle_out),
                StreamKind::Video => continue,
            };
            if let Some(language) = &stream.language {
                cmd = cmd
                    .arg(format!("-metadata:s:{}:{}", specifier, position))
                    .arg(format!("language={}", normalize_language(language)));
            }
            *position += 1;
        }

        cmd.overwrite().output(&job.output_file)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Escape a path for use inside an ffmpeg filter argument
fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | '[' | ']' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
