use crate::audio::types::DisplayBuffer;

/// Min and max sample values over a range of display frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

impl Peak {
    pub fn amplitude(&self) -> f32 {
        self.max.abs().max(self.min.abs())
    }
}

/// Reduce a display buffer to exactly `width` peak columns, mixing all
/// channels down to mono first.
pub fn peaks_for_width(display: &DisplayBuffer, width: usize) -> Vec<Peak> {
    let mono = to_mono(display);
    if mono.is_empty() || width == 0 {
        return Vec::new();
    }

    (0..width)
        .map(|i| {
            let start = i * mono.len() / width;
            let end = ((i + 1) * mono.len() / width).max(start + 1).min(mono.len());
            if start >= mono.len() {
                return Peak { min: 0.0, max: 0.0 };
            }
            mono[start..end].iter().fold(
                Peak {
                    min: f32::MAX,
                    max: f32::MIN,
                },
                |p, &s| Peak {
                    min: p.min.min(s),
                    max: p.max.max(s),
                },
            )
        })
        .collect()
}

fn to_mono(display: &DisplayBuffer) -> Vec<f32> {
    let ch = display.channel_count();
    if ch == 0 {
        return Vec::new();
    }
    (0..display.len())
        .map(|i| display.channels.iter().map(|row| row[i]).sum::<f32>() / ch as f32)
        .collect()
}

const LEVELS: &[char] = &[' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render the buffer as a one-line bar meter of `width` columns.
pub fn level_meter(display: &DisplayBuffer, width: usize) -> String {
    peaks_for_width(display, width)
        .iter()
        .map(|p| {
            let level = (p.amplitude().clamp(0.0, 1.0) * (LEVELS.len() - 1) as f32).round();
            LEVELS[level as usize]
        })
        .collect()
}
