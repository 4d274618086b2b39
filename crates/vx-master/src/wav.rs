//! WAV encoding of rendered slots as 16-bit PCM.

use std::io::Write;

use vx_ir::{Presets, SampleBuffer};

/// Write interleaved slots laid out per `presets` as a 16-bit PCM WAV.
pub fn write_wav(w: &mut impl Write, slots: &[SampleBuffer], presets: Presets) -> std::io::Result<()> {
    let num_channels = presets.pcm_channels;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let samples: usize = slots.iter().map(SampleBuffer::len).sum();
    let data_size = data_size(samples)?;

    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, num_channels, presets.samplerate, block_align, bits_per_sample)?;
    write_data_chunk(w, slots, data_size)
}

/// Size of the data chunk for `samples` 16-bit samples. The RIFF size field
/// adds 36 bytes on top and must still fit in 32 bits.
fn data_size(samples: usize) -> std::io::Result<u32> {
    samples
        .checked_mul(2)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .filter(|&bytes| bytes <= u32::MAX - 36)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} samples do not fit in a WAV file", samples),
            )
        })
}

pub fn slots_to_wav(slots: &[SampleBuffer], presets: Presets) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_wav(&mut buf, slots, presets)?;
    Ok(buf)
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(
    w: &mut impl Write,
    num_channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
) -> std::io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&num_channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())
}

fn write_data_chunk(w: &mut impl Write, slots: &[SampleBuffer], data_size: u32) -> std::io::Result<()> {
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for slot in slots {
        for i in 0..slot.len() {
            let s = (slot.get_f64(i) * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            w.write_all(&s.to_le_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_ir::SampleFormat;

    #[test]
    fn header_and_samples() {
        let presets = Presets::new(2, 48000, 2, SampleFormat::Float);
        let slot = SampleBuffer::Float(vec![0.5, -0.5, 1.0, 0.0]);
        let wav = slots_to_wav(&[slot], presets).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 8);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 2);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 48000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), 44 + 8);

        let samples: Vec<i16> = wav[44..]
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![16384, -16384, 32767, 0]);
    }

    #[test]
    fn oversized_render_is_rejected() {
        assert_eq!(data_size(4).unwrap(), 8);
        let max = (u32::MAX as usize - 36) / 2;
        assert!(data_size(max).is_ok());
        let err = data_size(max + 1).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(data_size(usize::MAX).is_err());
    }
}
