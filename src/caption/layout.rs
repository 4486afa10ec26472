use super::types::{Cue, FaceRegion, Position, StyleFlags};
use crate::config::SynthesisConfig;

const LOWER_THIRD: f64 = 2.0 / 3.0;
const UPPER_THIRD: f64 = 1.0 / 3.0;

/// Assign placement and style flags to every cue.
///
/// Without face data every cue sits at the bottom.
pub fn assign_layout(cues: &mut [Cue], faces: Option<&[FaceRegion]>, config: &SynthesisConfig) {
    let fade = config.fade();
    for cue in cues.iter_mut() {
        cue.position = match faces {
            Some(faces) => position_for(cue, faces),
            None => Position::Bottom,
        };

        let edge = fade.min(cue.duration() / 2);
        cue.style = StyleFlags {
            fade_in: edge,
            fade_out: edge,
            alt_color_highlight: cue.highlight_index.is_some() && config.highlight_alt_color,
        };
    }
}

fn position_for(cue: &Cue, faces: &[FaceRegion]) -> Position {
    let start = cue.start.as_secs_f64();
    let end = cue.end.as_secs_f64();

    let mut bottom_face = false;
    let mut top_face = false;
    for face in faces
        .iter()
        .filter(|face| face.frame_time >= start && face.frame_time <= end)
    {
        let center = face.center_y();
        if center > LOWER_THIRD {
            bottom_face = true;
        } else if center < UPPER_THIRD {
            top_face = true;
        }
    }

    match (bottom_face, top_face) {
        (true, false) => Position::Top,
        (true, true) => Position::Center,
        _ => Position::Bottom,
    }
}
