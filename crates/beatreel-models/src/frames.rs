//! Frame sequence naming shared by the capture loop and the encoder.

/// printf-style pattern FFmpeg's image2 demuxer reads the sequence with.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// File name for the frame at `index`. Must stay in sync with [`FRAME_PATTERN`].
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.png", index)
}

/// Number of frames captured for a duration: `floor(duration_secs * fps)`.
pub fn total_frames(duration_secs: u32, fps: u32) -> u64 {
    u64::from(duration_secs) * u64::from(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_names_sort_in_capture_order() {
        let names: Vec<String> = [0u64, 1, 9, 10, 99, 100, 17_999]
            .iter()
            .map(|i| frame_file_name(*i))
            .collect();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names[0], "frame_000000.png");
    }

    #[test]
    fn test_total_frames() {
        assert_eq!(total_frames(10, 30), 300);
        assert_eq!(total_frames(600, 30), 18_000);
        assert_eq!(total_frames(0, 30), 0);
    }
}
