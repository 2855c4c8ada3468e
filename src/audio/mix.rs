use crate::audio::types::{amplitude_to_dbfs, db_to_gain, AudioBuffer};
use crate::error::{AudioError, Result};

/// Level used when the requested BGM volume is zero
const SILENT_BGM_DB: f64 = -60.0;

/// Linear gain applied to the background track for a volume in `[0, 1]`
pub fn bgm_gain(volume: f32) -> f64 {
    let db = if volume > 0.0 {
        amplitude_to_dbfs(volume as f64)
    } else {
        SILENT_BGM_DB
    };
    db_to_gain(db)
}

/// Lay `bgm` under `voice`
///
/// The background is converted to the voice's rate and channel layout, looped
/// or trimmed to the voice length, attenuated and summed. The result keeps
/// the voice's length and format and is clipped to `[-1, 1]`.
pub fn mix_bgm(voice: &AudioBuffer, bgm: &AudioBuffer, volume: f32) -> Result<AudioBuffer> {
    if bgm.is_empty() {
        return Err(AudioError::StageFailed {
            stage: "bgm_mix".to_string(),
            reason: "background track is empty".to_string(),
        }
        .into());
    }

    let background = bgm
        .resample_linear(voice.sample_rate)
        .with_channels(voice.channels);
    let gain = bgm_gain(volume) as f32;

    let mut output = voice.clone();
    for (sample, bg) in output
        .samples
        .iter_mut()
        .zip(background.samples.iter().cycle())
    {
        *sample += bg * gain;
    }
    output.clip();
    Ok(output)
}
