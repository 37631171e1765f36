//! Object storage layout.
//!
//! - `inputs/<generation_id>/…` transient user assets
//! - `outputs/<owner>/chunk_NNN.mp4` per-chunk muxed segments
//! - `outputs/<owner>/final.mp4` stitched artifact
//! - `chunk_previews/<generation_id>/<unique>/…` dry-run outputs
//! - `temp_chunks/<job_id>/chunk_NNN.mp4` driver slices for the synth API

/// Prefix for a generation's transient input assets.
pub fn input_prefix(generation_id: &str) -> String {
    format!("inputs/{}", generation_id)
}

/// Driver slice uploaded for the synthesis service to fetch.
pub fn chunk_driver_path(job_id: &str, chunk_index: u32) -> String {
    format!("temp_chunks/{}/chunk_{:03}.mp4", job_id, chunk_index)
}

/// Muxed per-chunk segment in the outputs namespace. `owner` is the
/// generation id when linked, otherwise the job id.
pub fn output_segment_path(owner: &str, chunk_index: u32) -> String {
    format!("outputs/{}/chunk_{:03}.mp4", owner, chunk_index)
}

/// Final stitched artifact.
pub fn final_output_path(owner: &str) -> String {
    format!("outputs/{}/final.mp4", owner)
}

/// Prefix for dry-run preview artifacts. `unique` decouples repeated requests
/// for the same generation.
pub fn preview_prefix(generation_id: &str, unique: &str) -> String {
    format!("chunk_previews/{}/{}", generation_id, unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(
            chunk_driver_path("job-1", 7),
            "temp_chunks/job-1/chunk_007.mp4"
        );
        assert_eq!(
            output_segment_path("gen-1", 0),
            "outputs/gen-1/chunk_000.mp4"
        );
        assert_eq!(final_output_path("gen-1"), "outputs/gen-1/final.mp4");
        assert_eq!(
            preview_prefix("gen-1", "ab12"),
            "chunk_previews/gen-1/ab12"
        );
        assert_eq!(input_prefix("gen-1"), "inputs/gen-1");
    }
}
