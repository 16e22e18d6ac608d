// Integration tests for the chunked recorder
//
// These verify chunk rotation, flush-on-stop, artifact assembly by
// concatenation, the no-data path, and the interleaved video container.

use std::fs;
use tempfile::TempDir;
use tokio::sync::mpsc;
use warren_live::audio::devices::VideoFrame;
use warren_live::audio::graph::{MixFrame, MixSource};
use warren_live::audio::recorder::{ArtifactKind, ChunkedRecorder, RecorderConfig};

const RATE: u32 = 24_000;
const WAV_HEADER_LEN: usize = 44;

fn audio_config(chunk_secs: u64) -> RecorderConfig {
    RecorderConfig {
        kind: ArtifactKind::Audio,
        sample_rate: RATE,
        chunk_duration_secs: chunk_secs,
    }
}

fn second_of_audio(timestamp_ms: u64) -> MixFrame {
    MixFrame {
        samples: vec![0.25; RATE as usize],
        sample_rate: RATE,
        timestamp_ms,
        source: MixSource::Agent,
    }
}

#[tokio::test]
async fn three_chunk_recording_assembles_by_concatenation() {
    let (tx, rx) = mpsc::channel(16);
    let mut handle = ChunkedRecorder::start(audio_config(1), rx, None);

    // Three seconds of audio with 1s chunks -> chunks of
    // header+48000, 48000, and 48000 bytes
    for i in 0..3u64 {
        tx.send(second_of_audio(i * 1000)).await.unwrap();
    }
    drop(tx);

    let artifact = handle.stop().await.expect("artifact expected");

    let chunk_bytes = RATE as usize * 2;
    assert_eq!(
        artifact.data.len(),
        WAV_HEADER_LEN + 3 * chunk_bytes,
        "artifact must equal the sum of the chunk sizes"
    );
    assert_eq!(&artifact.data[0..4], b"RIFF");
    assert_eq!(artifact.kind, ArtifactKind::Audio);
    assert_eq!(artifact.kind.mime(), "audio/wav");
    assert_eq!(artifact.duration_ms, 3000);
}

#[tokio::test]
async fn aborted_recording_with_no_data_yields_no_artifact() {
    let (tx, rx) = mpsc::channel::<MixFrame>(4);
    let mut handle = ChunkedRecorder::start(audio_config(10), rx, None);

    drop(tx); // nothing ever flowed
    assert!(handle.stop().await.is_none());
}

#[tokio::test]
async fn stop_is_a_noop_the_second_time() {
    let (tx, rx) = mpsc::channel(4);
    let mut handle = ChunkedRecorder::start(audio_config(10), rx, None);

    tx.send(second_of_audio(0)).await.unwrap();
    drop(tx);

    assert!(handle.stop().await.is_some());
    assert!(handle.stop().await.is_none());
    assert!(handle.stop().await.is_none());
}

#[tokio::test]
async fn video_recording_interleaves_both_tracks() {
    let (audio_tx, audio_rx) = mpsc::channel(16);
    let (video_tx, video_rx) = mpsc::channel(16);

    let config = RecorderConfig {
        kind: ArtifactKind::AudioVideo,
        sample_rate: RATE,
        chunk_duration_secs: 10,
    };
    let mut handle = ChunkedRecorder::start(config, audio_rx, Some(video_rx));

    for i in 0..2u64 {
        audio_tx.send(second_of_audio(i * 1000)).await.unwrap();
    }
    for i in 0..3u64 {
        video_tx
            .send(VideoFrame {
                data: vec![0xAB; 100 + i as usize],
                timestamp_ms: i * 200,
            })
            .await
            .unwrap();
    }
    drop(audio_tx);
    drop(video_tx);

    let artifact = handle.stop().await.expect("artifact expected");
    assert_eq!(artifact.kind, ArtifactKind::AudioVideo);
    assert_eq!(artifact.kind.mime(), "video/x-interleaved");
    assert_eq!(&artifact.data[0..4], b"ILV1");

    // Walk the record framing: tag byte, u32 LE length, payload
    let mut pos = 4;
    let mut audio_records = 0;
    let mut video_records = 0;
    while pos < artifact.data.len() {
        let tag = artifact.data[pos];
        let len = u32::from_le_bytes(artifact.data[pos + 1..pos + 5].try_into().unwrap()) as usize;
        match tag {
            0x01 => audio_records += 1,
            0x02 => video_records += 1,
            other => panic!("unknown track tag {other}"),
        }
        pos += 5 + len;
    }
    assert_eq!(pos, artifact.data.len(), "container must parse exactly");
    assert_eq!(audio_records, 2);
    assert_eq!(video_records, 3);
}

#[tokio::test]
async fn artifact_persists_byte_for_byte() {
    let (tx, rx) = mpsc::channel(8);
    let mut handle = ChunkedRecorder::start(audio_config(10), rx, None);

    tx.send(second_of_audio(0)).await.unwrap();
    drop(tx);

    let artifact = handle.stop().await.unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("interview.wav");
    fs::write(&path, &artifact.data).unwrap();

    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), artifact.data.len());
    assert_eq!(&on_disk[0..4], b"RIFF");
}

#[tokio::test]
async fn short_recording_still_carries_container_header() {
    let (tx, rx) = mpsc::channel(4);
    let mut handle = ChunkedRecorder::start(audio_config(10), rx, None);

    tx.send(MixFrame {
        samples: vec![0.5; 240],
        sample_rate: RATE,
        timestamp_ms: 0,
        source: MixSource::Microphone,
    })
    .await
    .unwrap();
    drop(tx);

    let artifact = handle.stop().await.unwrap();
    assert_eq!(artifact.data.len(), WAV_HEADER_LEN + 480);
    assert_eq!(artifact.duration_ms, 10); // 240 samples at 24kHz
}
