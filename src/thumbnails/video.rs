//! Looping GIF previews rendered with ffmpeg.
//!
//! The preview is cut from the middle of the clip. A palette is generated
//! first for better colour; if that pass fails a plain single-pass render is
//! tried once before giving up.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::{ThumbnailConfig, ToolsConfig};
use crate::tools::{run_with_timeout, ToolError};

/// Start offset that centres a `clip` second preview in the source.
pub fn clip_offset(duration: Option<f64>, clip: f64) -> f64 {
    match duration {
        Some(d) if d > clip => (d - clip) / 2.0,
        _ => 0.0,
    }
}

/// Temporary palette image, removed when dropped.
struct Palette(PathBuf);

impl Palette {
    fn for_target(target: &Path) -> Self {
        Self(target.with_extension("palette.png"))
    }
}

impl Drop for Palette {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

pub fn render_preview(
    source: &Path,
    target: &Path,
    duration: Option<f64>,
    config: &ThumbnailConfig,
    tools: &ToolsConfig,
) -> Result<(), ToolError> {
    let offset = clip_offset(duration, config.clip_seconds);
    let timeout = Duration::from_secs(tools.timeout_secs);
    let filters = format!("fps={},scale={}:-1:flags=lanczos", config.fps, config.width);

    let palette = Palette::for_target(target);
    let mut args = input_args(source, offset, config.clip_seconds);
    args.extend(os_args(["-vf", &format!("{},palettegen", filters)]));
    args.push(palette.0.clone().into_os_string());

    if let Err(e) = run_with_timeout(&tools.ffmpeg, &args, timeout) {
        debug!(path = %source.display(), error = %e, "Palette pass failed, rendering without palette");
        drop(palette);

        let mut args = input_args(source, offset, config.clip_seconds);
        args.extend(os_args(["-vf", &filters]));
        args.push(target.as_os_str().to_owned());
        run_with_timeout(&tools.ffmpeg, &args, timeout)?;
        return Ok(());
    }

    let mut args = input_args(source, offset, config.clip_seconds);
    args.extend(os_args(["-i"]));
    args.push(palette.0.clone().into_os_string());
    args.extend(os_args([
        "-lavfi",
        &format!("{} [x]; [x][1:v] paletteuse", filters),
    ]));
    args.push(target.as_os_str().to_owned());
    run_with_timeout(&tools.ffmpeg, &args, timeout)?;

    Ok(())
}

fn input_args(source: &Path, offset: f64, clip: f64) -> Vec<OsString> {
    let mut args = os_args([
        "-y",
        "-v",
        "error",
        "-ss",
        &format!("{:.3}", offset),
        "-t",
        &format!("{:.3}", clip),
        "-i",
    ]);
    args.push(source.as_os_str().to_owned());
    args
}

fn os_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clip_offset_centres_preview() {
        assert_eq!(clip_offset(Some(13.0), 3.0), 5.0);
        assert_eq!(clip_offset(Some(2.0), 3.0), 0.0);
        assert_eq!(clip_offset(None, 3.0), 0.0);
    }

    #[test]
    fn test_missing_transcoder_fails_without_leftovers() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"not a video").unwrap();
        let target = dir.path().join("clip_00000000.gif");
        let tools = ToolsConfig {
            ffmpeg: "/nonexistent/ffmpeg".into(),
            ..Default::default()
        };

        let result = render_preview(&source, &target, Some(60.0), &ThumbnailConfig::default(), &tools);

        assert!(matches!(result, Err(ToolError::Spawn { .. })));
        assert!(!target.with_extension("palette.png").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_palette_is_removed_after_render() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        // Stand-in transcoder that writes its last argument.
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\nfor last; do :; done\necho frame > \"$last\"\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"video").unwrap();
        let target = dir.path().join("clip_00000000.gif");
        let tools = ToolsConfig {
            ffmpeg: fake,
            ..Default::default()
        };

        render_preview(&source, &target, Some(60.0), &ThumbnailConfig::default(), &tools).unwrap();

        assert!(target.exists());
        assert!(!target.with_extension("palette.png").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_single_pass_after_palette_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let calls = dir.path().join("calls.log");
        // Rejects the palette pass, renders anything else.
        let fake = dir.path().join("ffmpeg");
        let script = format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\nfor arg; do case \"$arg\" in *palettegen*) exit 1;; esac; done\nfor last; do :; done\necho frame > \"$last\"\n",
            calls.display()
        );
        std::fs::write(&fake, script).unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"video").unwrap();
        let target = dir.path().join("clip_00000000.gif");
        let tools = ToolsConfig {
            ffmpeg: fake,
            ..Default::default()
        };

        let result = render_preview(&source, &target, Some(60.0), &ThumbnailConfig::default(), &tools);

        assert!(result.is_ok());
        assert!(target.exists());
        assert!(!target.with_extension("palette.png").exists());

        let log = std::fs::read_to_string(&calls).unwrap();
        let invocations: Vec<&str> = log.lines().collect();
        assert_eq!(invocations.len(), 2);
        assert!(invocations[0].contains("palettegen"));
        assert!(!invocations[1].contains("palette"));
    }
}
