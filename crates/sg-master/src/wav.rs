//! WAV encoding for 16-bit stereo PCM.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use sg_engine::Frame;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec { channels: 2, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int }
}

pub fn write_wav<W: Write + Seek>(w: W, frames: &[Frame], sample_rate: u32) -> hound::Result<()> {
    let mut writer = WavWriter::new(w, spec(sample_rate))?;
    let mut samples = writer.get_i16_writer(frames.len() as u32 * 2);
    for frame in frames {
        let (left, right) = frame.to_i16();
        samples.write_sample(left);
        samples.write_sample(right);
    }
    samples.flush()?;
    writer.finalize()
}

pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> hound::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    write_wav(&mut buf, frames, sample_rate)?;
    Ok(buf.into_inner())
}

pub fn save_wav(path: impl AsRef<Path>, frames: &[Frame], sample_rate: u32) -> hound::Result<()> {
    let mut writer = WavWriter::create(path, spec(sample_rate))?;
    for frame in frames {
        let (left, right) = frame.to_i16();
        writer.write_sample(left)?;
        writer.write_sample(right)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_samples_read_back() {
        let frames = [Frame::mono(0.5), Frame { left: -1.0, right: 1.0 }];
        let bytes = frames_to_wav(&frames, 22_050).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec(), spec(22_050));
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![16_383, 16_383, -32_767, 32_767]);
    }
}
