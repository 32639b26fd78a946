//! The `.ae1` wavetable cache.
//!
//! Building a rank takes seconds; the result depends only on the stop
//! definition, sample rate, tuning frequency and temperament. Ranks are
//! therefore cached to disk and reloaded when every one of those inputs
//! still matches. All fields are little-endian.
//!
//! Layout:
//! ```text
//! 16-byte header   magic "ae1\0", version, reserved
//! 64-byte rank     n0, n1, fsamp, fbase, scale[12]
//! per pipe         32-byte record header + samples (see pipewave)
//! ```

use crate::rank::Rankwave;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"ae1\0";
const VERSION: u8 = 1;

impl Rankwave {
    /// Write this rank's wavetables to `path`.
    pub fn save_file(
        &mut self,
        path: &Path,
        fsamp: f32,
        fbase: f32,
        scale: &[f32; 12],
    ) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);

        let mut head = [0u8; 16];
        head[0..4].copy_from_slice(MAGIC);
        head[4] = VERSION;
        w.write_all(&head)?;

        let mut desc = [0u8; 64];
        desc[4] = self.n0();
        desc[5] = self.n1();
        desc[8..12].copy_from_slice(&fsamp.to_le_bytes());
        desc[12..16].copy_from_slice(&fbase.to_le_bytes());
        for (i, s) in scale.iter().enumerate() {
            desc[16 + 4 * i..20 + 4 * i].copy_from_slice(&s.to_le_bytes());
        }
        w.write_all(&desc)?;

        for p in self.pipes() {
            p.write_record(&mut w)?;
        }
        w.flush()?;
        self.set_modified(false);
        Ok(())
    }

    /// Load wavetables from `path`, rejecting any parameter mismatch so a
    /// stale cache can never detune the instrument.
    pub fn load_file(
        &mut self,
        path: &Path,
        fsamp: f32,
        fbase: f32,
        scale: &[f32; 12],
    ) -> Result<()> {
        let mut r = BufReader::new(File::open(path)?);

        let mut head = [0u8; 16];
        r.read_exact(&mut head)?;
        if &head[0..4] != MAGIC {
            return Err(Error::Magic);
        }
        if head[4] != VERSION {
            return Err(Error::Version(head[4]));
        }

        let mut desc = [0u8; 64];
        r.read_exact(&mut desc)?;
        if desc[4] != self.n0() || desc[5] != self.n1() {
            return Err(Error::NoteRange {
                file_n0: desc[4],
                file_n1: desc[5],
                rank_n0: self.n0(),
                rank_n1: self.n1(),
            });
        }
        let f = f32::from_le_bytes(desc[8..12].try_into().unwrap());
        if (f - fsamp).abs() > 0.1 {
            return Err(Error::SampleRate(f));
        }
        let f = f32::from_le_bytes(desc[12..16].try_into().unwrap());
        if (f - fbase).abs() > 0.1 {
            return Err(Error::Tuning(f));
        }
        for (i, s) in scale.iter().enumerate() {
            let f = f32::from_le_bytes(desc[16 + 4 * i..20 + 4 * i].try_into().unwrap());
            if (f / s - 1.0).abs() > 6e-5 {
                return Err(Error::Temperament(i));
            }
        }

        for p in self.pipes_mut() {
            p.read_record(&mut r)?;
        }
        self.set_modified(false);
        Ok(())
    }
}
