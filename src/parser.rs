// ═══════════════════════════════════════════════════════════════════════════════
// 📦 parser.rs - Binary CSI Frame Decoder
// ═══════════════════════════════════════════════════════════════════════════════
// This module decodes the vendor CSI frame stream produced by the monitor-mode
// capture tooling. Malformed frames are dropped, counted, and the decoder
// resyncs on the next magic marker. Only a failing byte stream ends decoding.
// ═══════════════════════════════════════════════════════════════════════════════
//
// Wire layout (byte order declared by the magic marker):
//
// ```text
// Offset  Size  Field
// ------  ----  -----
// 0       4     Magic 0xC511F4A3
// 4       1     RSSI (i8)
// 5       2     Frame control (u16)
// 7       6     Source MAC
// 13      2     Sequence number (u16)
// 15      2     Subcarrier count K (u16)
// 17      1     Antenna chains (u8)
// 18      4*N   N = K * chains pairs of (i16 I, i16 Q), chain-major
// ```

use std::io::{Cursor, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use chrono::Utc;
use num_complex::Complex;
use tracing::{debug, trace, warn};

use crate::error::{DecodeError, FrameFault};
use crate::state::{format_mac, CsiFrame, FrameShape};

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Wire Constants / ثوابت صيغة الإرسال
// ═══════════════════════════════════════════════════════════════════════════════

/// Frame magic marker / علامة بداية الإطار
pub const CSI_MAGIC: u32 = 0xC511_F4A3;

/// Fixed header length in bytes / طول الترويسة بالبايت
pub const HEADER_LEN: usize = 18;

/// Bytes per (I, Q) pair
pub const IQ_PAIR_LEN: usize = 4;

/// Upper bound on subcarriers per chain (160 MHz HE is under this)
pub const MAX_SUBCARRIERS: usize = 2048;

/// Upper bound on antenna chains
pub const MAX_ANTENNA_CHAINS: usize = 8;

const MAGIC_LE: [u8; 4] = CSI_MAGIC.to_le_bytes();
const MAGIC_BE: [u8; 4] = CSI_MAGIC.to_be_bytes();

/// Read chunk size / حجم القراءة
const READ_CHUNK: usize = 4096;

/// Byte order declared by a frame's magic marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireOrder {
    Little,
    Big,
}

/// Detect a magic marker at `pos`
fn magic_at(buf: &[u8], pos: usize) -> Option<WireOrder> {
    match buf.get(pos..pos + 4)? {
        b if b == MAGIC_LE => Some(WireOrder::Little),
        b if b == MAGIC_BE => Some(WireOrder::Big),
        _ => None,
    }
}

/// Find the first magic marker at or after `from`
fn find_magic(buf: &[u8], from: usize) -> Option<usize> {
    (from..buf.len().saturating_sub(3)).find(|&pos| magic_at(buf, pos).is_some())
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Decoder Statistics / إحصائيات المفكك
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters updated as the stream is decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames handed to the caller
    pub frames: u64,
    /// Malformed frames dropped (one per resync)
    pub dropped: u64,
    /// Well-formed frames of the wrong session shape
    pub shape_mismatches: u64,
    /// Frames skipped by the source MAC filter
    pub filtered: u64,
    /// Bytes discarded while resyncing
    pub bytes_skipped: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Frame Header / ترويسة الإطار
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    order: WireOrder,
    rssi: i8,
    frame_control: u16,
    source_mac: [u8; 6],
    sequence: u16,
    shape: FrameShape,
}

impl FrameHeader {
    fn frame_len(&self) -> usize {
        HEADER_LEN + self.shape.cells() * IQ_PAIR_LEN
    }

    /// Parse the 18-byte header; `buf` must start with a magic marker
    fn parse(buf: &[u8], order: WireOrder) -> std::io::Result<Self> {
        match order {
            WireOrder::Little => Self::parse_with::<LittleEndian>(buf, order),
            WireOrder::Big => Self::parse_with::<BigEndian>(buf, order),
        }
    }

    fn parse_with<B: ByteOrder>(buf: &[u8], order: WireOrder) -> std::io::Result<Self> {
        let mut cursor = Cursor::new(buf);
        cursor.set_position(4);

        let rssi = cursor.read_i8()?;
        let frame_control = cursor.read_u16::<B>()?;
        let mut source_mac = [0u8; 6];
        cursor.read_exact(&mut source_mac)?;
        let sequence = cursor.read_u16::<B>()?;
        let subcarriers = cursor.read_u16::<B>()? as usize;
        let antenna_chains = cursor.read_u8()? as usize;

        Ok(Self {
            order,
            rssi,
            frame_control,
            source_mac,
            sequence,
            shape: FrameShape::new(subcarriers, antenna_chains),
        })
    }

    fn validate(&self) -> Result<(), FrameFault> {
        let shape = self.shape;
        if shape.subcarriers == 0
            || shape.antenna_chains == 0
            || shape.subcarriers > MAX_SUBCARRIERS
            || shape.antenna_chains > MAX_ANTENNA_CHAINS
        {
            return Err(FrameFault::InvalidShape {
                subcarriers: shape.subcarriers,
                chains: shape.antenna_chains,
            });
        }
        Ok(())
    }
}

/// Decode the I/Q payload of a complete frame into complex values
fn decode_payload(payload: &[u8], order: WireOrder) -> Vec<Complex<f64>> {
    payload
        .chunks_exact(IQ_PAIR_LEN)
        .map(|pair| {
            let (i, q) = match order {
                WireOrder::Little => (LittleEndian::read_i16(&pair[..2]), LittleEndian::read_i16(&pair[2..])),
                WireOrder::Big => (BigEndian::read_i16(&pair[..2]), BigEndian::read_i16(&pair[2..])),
            };
            Complex::new(i as f64, q as f64)
        })
        .collect()
}

/// Outcome of looking at the frame that starts at buffer offset 0
enum Candidate {
    Complete(FrameHeader, usize),
    Incomplete,
    Fault(FrameFault),
}

fn utc_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 CSI Decoder / مفكك CSI
// ═══════════════════════════════════════════════════════════════════════════════

/// Streaming decoder over any byte source
/// مفكك متدفق فوق أي مصدر بايتات
pub struct CsiDecoder<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    eof: bool,

    /// Last read timed out: everything the source has sent is buffered
    idle: bool,

    /// Set while discarding bytes between a fault and the next marker
    resyncing: bool,

    expected_shape: Option<FrameShape>,
    mac_filter: Option<[u8; 6]>,

    clock: fn() -> i64,
    last_timestamp: i64,

    /// Checked while the source is idle so a quiet serial line can be stopped
    stop_flag: Option<Arc<AtomicBool>>,

    stats: DecoderStats,
}

impl<R: Read> CsiDecoder<R> {
    /// Create a decoder that accepts any frame shape
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK * 2),
            eof: false,
            idle: false,
            resyncing: false,
            expected_shape: None,
            mac_filter: None,
            clock: utc_millis,
            last_timestamp: i64::MIN,
            stop_flag: None,
            stats: DecoderStats::default(),
        }
    }

    /// Only pass frames of the session shape; others are counted and dropped
    pub fn with_shape(mut self, shape: FrameShape) -> Self {
        self.expected_shape = Some(shape);
        self
    }

    /// Only pass frames from this transmitter
    pub fn with_mac_filter(mut self, mac: Option<[u8; 6]>) -> Self {
        self.mac_filter = mac;
        self
    }

    /// Replace the capture clock (Unix ms)
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// End decoding early once `flag` is set
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. Malformed frames never
    /// surface here; they only advance the drop counters.
    pub fn next_frame(&mut self) -> Result<Option<CsiFrame>, DecodeError> {
        loop {
            if self.buffer.len() < 4 {
                if self.eof {
                    self.finish_stream();
                    return Ok(None);
                }
                self.fill()?;
                continue;
            }

            let Some(order) = magic_at(&self.buffer, 0) else {
                self.resync(0, FrameFault::MissingMagic { skipped: 0 });
                continue;
            };
            self.resyncing = false;

            match self.classify_head(order) {
                Candidate::Complete(header, len) => {
                    let frame = self.build_frame(header, len);
                    self.buffer.drain(..len);

                    if let Some(expected) = self.expected_shape {
                        if frame.shape != expected {
                            self.stats.shape_mismatches += 1;
                            debug!(shape = %frame.shape, expected = %expected, "dropping frame of foreign shape");
                            continue;
                        }
                    }
                    if let Some(mac) = self.mac_filter {
                        if frame.source_mac != mac {
                            self.stats.filtered += 1;
                            trace!(mac = %format_mac(&frame.source_mac), "frame from another transmitter");
                            continue;
                        }
                    }

                    self.stats.frames += 1;
                    trace!(
                        sequence = frame.sequence,
                        mac = %format_mac(&frame.source_mac),
                        rssi = frame.rssi,
                        frame_control = frame.frame_control,
                        amplitude = frame.amplitude(0, 0).unwrap_or(f64::NAN),
                        phase = frame.phases().first().copied().unwrap_or(f64::NAN),
                        "frame decoded"
                    );
                    return Ok(Some(frame));
                }
                Candidate::Incomplete => {
                    if self.eof {
                        let got = self.buffer.len();
                        let needed = FrameHeader::parse(&self.buffer, order)
                            .map(|h| h.frame_len())
                            .unwrap_or(HEADER_LEN);
                        self.resync(1, FrameFault::Truncated { needed, got });
                    } else {
                        self.fill()?;
                    }
                }
                Candidate::Fault(fault) => self.resync(1, fault),
            }
        }
    }

    /// Check the frame at offset 0 without consuming it.
    ///
    /// A frame is complete when the bytes after its declared end are a magic
    /// marker or the end of available input. Otherwise a marker inside the
    /// frame means it was cut short; with no such marker the frame stands
    /// and whatever follows is dropped on its own.
    fn classify_head(&self, order: WireOrder) -> Candidate {
        let buf = &self.buffer;
        if buf.len() < HEADER_LEN {
            return Candidate::Incomplete;
        }

        let header = match FrameHeader::parse(buf, order) {
            Ok(h) => h,
            Err(_) => return Candidate::Incomplete,
        };
        if let Err(fault) = header.validate() {
            return Candidate::Fault(fault);
        }

        let frame_len = header.frame_len();
        if buf.len() < frame_len {
            return Candidate::Incomplete;
        }

        let drained = self.eof || self.idle;
        let followed_by_marker = magic_at(buf, frame_len).is_some();
        let ends_input = buf.len() == frame_len && drained;
        if followed_by_marker || ends_input {
            return Candidate::Complete(header, frame_len);
        }
        if buf.len() < frame_len + 4 && !drained {
            return Candidate::Incomplete;
        }

        match find_magic(&buf[..(frame_len + 3).min(buf.len())], 1) {
            Some(pos) if pos < frame_len => Candidate::Fault(FrameFault::LengthMismatch {
                declared: frame_len,
                available: pos,
            }),
            _ => Candidate::Complete(header, frame_len),
        }
    }

    fn build_frame(&mut self, header: FrameHeader, len: usize) -> CsiFrame {
        let subcarriers = decode_payload(&self.buffer[HEADER_LEN..len], header.order);

        // Capture time never goes backwards within a session
        let timestamp = (self.clock)().max(self.last_timestamp);
        self.last_timestamp = timestamp;

        CsiFrame {
            rssi: header.rssi,
            frame_control: header.frame_control,
            source_mac: header.source_mac,
            sequence: header.sequence,
            ..CsiFrame::new(timestamp, header.shape, subcarriers)
        }
    }

    /// Drop the current frame and skip ahead to the next marker at or after
    /// `from`. A run of garbage spanning several reads counts as one drop.
    fn resync(&mut self, from: usize, fault: FrameFault) {
        if !self.resyncing {
            self.stats.dropped += 1;
            warn!(%fault, dropped = self.stats.dropped, "dropping malformed CSI frame");
        }

        match find_magic(&self.buffer, from.max(1)) {
            Some(pos) => {
                self.skip(pos);
                self.resyncing = false;
            }
            None => {
                // Keep a possible partial marker at the tail
                let keep_from = self.buffer.len().saturating_sub(3).max(from.min(self.buffer.len()));
                self.skip(keep_from);
                self.resyncing = true;
            }
        }
    }

    fn skip(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.stats.bytes_skipped += count as u64;
    }

    /// Account for leftover bytes when the stream closes
    fn finish_stream(&mut self) {
        if !self.buffer.is_empty() {
            if !self.resyncing {
                self.stats.dropped += 1;
                warn!(bytes = self.buffer.len(), "stream ended inside a CSI frame");
            }
            let rest = self.buffer.len();
            self.skip(rest);
        }
        self.resyncing = false;
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn fill(&mut self) -> Result<(), DecodeError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    self.idle = false;
                    return Ok(());
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                // Serial ports report an idle line as a timeout
                Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    if self.stop_requested() {
                        self.eof = true;
                    }
                    self.idle = true;
                    return Ok(());
                }
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }
}

impl<R: Read> Iterator for CsiDecoder<R> {
    type Item = Result<CsiFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Test Frame Builder / منشئ إطارات الاختبار
// ═══════════════════════════════════════════════════════════════════════════════

/// Encoders for synthetic capture streams used by tests
#[cfg(test)]
pub(crate) mod testing {
    use byteorder::WriteBytesExt;

    use super::*;

    pub const TEST_MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    /// Encode one frame with the given I/Q pairs
    pub fn encode_frame(
        order: WireOrder,
        mac: [u8; 6],
        sequence: u16,
        shape: FrameShape,
        pairs: &[(i16, i16)],
    ) -> Vec<u8> {
        match order {
            WireOrder::Little => encode_with::<LittleEndian>(mac, sequence, shape, pairs),
            WireOrder::Big => encode_with::<BigEndian>(mac, sequence, shape, pairs),
        }
    }

    fn encode_with<B: ByteOrder>(
        mac: [u8; 6],
        sequence: u16,
        shape: FrameShape,
        pairs: &[(i16, i16)],
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + pairs.len() * IQ_PAIR_LEN);
        buf.write_u32::<B>(CSI_MAGIC).unwrap();
        buf.write_i8(-42).unwrap();
        buf.write_u16::<B>(0x0080).unwrap();
        buf.extend_from_slice(&mac);
        buf.write_u16::<B>(sequence).unwrap();
        buf.write_u16::<B>(shape.subcarriers as u16).unwrap();
        buf.write_u8(shape.antenna_chains as u8).unwrap();
        for &(i, q) in pairs {
            buf.write_i16::<B>(i).unwrap();
            buf.write_i16::<B>(q).unwrap();
        }
        buf
    }

    /// Little-endian frame with every cell set to (i, q)
    pub fn constant_frame(shape: FrameShape, sequence: u16, i: i16, q: i16) -> Vec<u8> {
        let pairs = vec![(i, q); shape.cells()];
        encode_frame(WireOrder::Little, TEST_MAC, sequence, shape, &pairs)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn fixed_clock() -> i64 {
        1_700_000_000_000
    }

    fn decode_all(bytes: Vec<u8>) -> (Vec<CsiFrame>, DecoderStats) {
        let mut decoder = CsiDecoder::new(Cursor::new(bytes)).with_clock(fixed_clock);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            frames.push(frame);
        }
        (frames, decoder.stats())
    }

    #[test]
    fn test_decode_known_iq_values() {
        let shape = FrameShape::new(4, 2);
        let pairs: Vec<(i16, i16)> = vec![
            (3, 4), (-3, 4), (0, -7), (100, 0),
            (-1200, 500), (32767, -32768), (0, 0), (12, -5),
        ];
        let bytes = encode_frame(WireOrder::Little, TEST_MAC, 9, shape, &pairs);

        let (frames, stats) = decode_all(bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(stats.dropped, 0);

        let frame = &frames[0];
        assert_eq!(frame.subcarriers.len(), shape.cells());
        assert_eq!(frame.shape, shape);
        assert_eq!(frame.rssi, -42);
        assert_eq!(frame.sequence, 9);
        assert_eq!(frame.source_mac, TEST_MAC);

        for chain in 0..2 {
            for sc in 0..4 {
                let (i, q) = pairs[chain * 4 + sc];
                let expected = ((i as f64).powi(2) + (q as f64).powi(2)).sqrt();
                assert_eq!(frame.amplitude(chain, sc), Some(expected));
            }
        }
        assert!((frame.phases()[2] - (-std::f64::consts::FRAC_PI_2)).abs() < 1e-12);
    }

    #[test]
    fn test_big_endian_frame_decodes_identically() {
        let shape = FrameShape::new(3, 1);
        let pairs = vec![(10, -20), (300, 400), (-5, 7)];
        let le = encode_frame(WireOrder::Little, TEST_MAC, 1, shape, &pairs);
        let be = encode_frame(WireOrder::Big, TEST_MAC, 1, shape, &pairs);

        let (le_frames, _) = decode_all(le);
        let (be_frames, _) = decode_all(be);
        assert_eq!(le_frames, be_frames);
    }

    #[test]
    fn test_resync_after_garbage_between_frames() {
        let shape = FrameShape::new(8, 1);
        let mut stream = constant_frame(shape, 1, 10, 10);
        stream.extend_from_slice(&[0x13, 0x37, 0x00, 0xFF, 0x42, 0x42, 0x42]);
        stream.extend(constant_frame(shape, 2, 20, 0));

        let (frames, stats) = decode_all(stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(frames[1].sequence, 2);
        assert_eq!(frames[1].amplitude(0, 3), Some(20.0));
    }

    #[test]
    fn test_resync_after_corrupted_magic() {
        let shape = FrameShape::new(8, 1);
        let mut corrupted = constant_frame(shape, 2, 5, 5);
        corrupted[1] ^= 0xFF;

        let mut stream = constant_frame(shape, 1, 10, 10);
        stream.extend(corrupted);
        stream.extend(constant_frame(shape, 3, 30, 40));

        let (frames, stats) = decode_all(stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(frames[0].sequence, 1);
        assert_eq!(frames[1].sequence, 3);
        assert_eq!(frames[1].amplitude(0, 0), Some(50.0));
    }

    #[test]
    fn test_resync_after_truncated_frame() {
        let shape = FrameShape::new(8, 1);
        let mut truncated = constant_frame(shape, 2, 5, 5);
        truncated.truncate(HEADER_LEN + 10);

        let mut stream = constant_frame(shape, 1, 10, 10);
        stream.extend(truncated);
        stream.extend(constant_frame(shape, 3, 1, 1));

        let (frames, stats) = decode_all(stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(frames[1].sequence, 3);
    }

    #[test]
    fn test_stream_ending_mid_frame_counts_one_drop() {
        let shape = FrameShape::new(8, 1);
        let mut stream = constant_frame(shape, 1, 10, 10);
        let partial = constant_frame(shape, 2, 10, 10);
        stream.extend_from_slice(&partial[..HEADER_LEN + 3]);

        let (frames, stats) = decode_all(stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_marker_bytes_inside_payload_are_data() {
        let shape = FrameShape::new(4, 1);
        // (0xF4A3, 0xC511) little-endian spells the magic marker
        let marker_pair = (0xF4A3u16 as i16, 0xC511u16 as i16);
        let pairs = vec![(1, 2), marker_pair, marker_pair, (3, 4)];
        let marker_mac = [0xA3, 0xF4, 0x11, 0xC5, 0x00, 0x01];

        let mut stream = constant_frame(shape, 1, 5, 5);
        stream.extend(encode_frame(WireOrder::Little, TEST_MAC, 2, shape, &pairs));
        stream.extend(constant_frame(shape, 3, 5, 5));
        stream.extend(encode_frame(WireOrder::Little, marker_mac, 4, shape, &pairs));

        let (frames, stats) = decode_all(stream);
        let sequences: Vec<u16> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.bytes_skipped, 0);

        let expected = Complex::new(-2909.0, -15087.0);
        assert_eq!(frames[1].subcarriers[1], expected);
        assert_eq!(frames[3].source_mac, marker_mac);
    }

    /// Hands out its bytes once, then reports an idle line forever
    struct QuietAfter(Option<Vec<u8>>);

    impl Read for QuietAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.take() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => Err(std::io::Error::new(ErrorKind::TimedOut, "idle")),
            }
        }
    }

    #[test]
    fn test_last_frame_of_idle_source_is_not_held_back() {
        let shape = FrameShape::new(4, 1);
        let mut decoder = CsiDecoder::new(QuietAfter(Some(constant_frame(shape, 7, 1, 1))));

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_invalid_shape_is_dropped() {
        let mut stream = encode_frame(WireOrder::Little, TEST_MAC, 1, FrameShape::new(0, 1), &[]);
        stream.extend(constant_frame(FrameShape::new(4, 1), 2, 1, 2));

        let (frames, stats) = decode_all(stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_shape_mismatch_and_mac_filter() {
        let session = FrameShape::new(4, 1);
        let other_mac = [1, 2, 3, 4, 5, 6];

        let mut stream = constant_frame(session, 1, 1, 1);
        stream.extend(constant_frame(FrameShape::new(6, 1), 2, 1, 1));
        stream.extend(encode_frame(WireOrder::Little, other_mac, 3, session, &[(1, 1); 4]));
        stream.extend(constant_frame(session, 4, 1, 1));

        let mut decoder = CsiDecoder::new(Cursor::new(stream))
            .with_shape(session)
            .with_mac_filter(Some(TEST_MAC));
        let sequences: Vec<u16> = decoder.by_ref().map(|f| f.unwrap().sequence).collect();

        assert_eq!(sequences, vec![1, 4]);
        let stats = decoder.stats();
        assert_eq!(stats.shape_mismatches, 1);
        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let shape = FrameShape::new(2, 1);
        let mut stream = Vec::new();
        for seq in 0..20 {
            stream.extend(constant_frame(shape, seq, 1, 1));
        }

        let decoder = CsiDecoder::new(Cursor::new(stream));
        let stamps: Vec<i64> = decoder.map(|f| f.unwrap().timestamp).collect();
        assert_eq!(stamps.len(), 20);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    /// Reader that hands out one byte per call, like a slow pipe
    struct Trickle(Vec<u8>, usize);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.1 >= self.0.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[self.1];
            self.1 += 1;
            Ok(1)
        }
    }

    #[test]
    fn test_garbage_split_across_reads_counts_once() {
        let shape = FrameShape::new(4, 1);
        let mut stream = constant_frame(shape, 1, 3, 4);
        stream.extend(std::iter::repeat(0x55).take(37));
        stream.extend(constant_frame(shape, 2, 3, 4));

        let mut decoder = CsiDecoder::new(Trickle(stream, 0));
        let frames: Vec<CsiFrame> = decoder.by_ref().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(decoder.stats().dropped, 1);
    }

    #[test]
    fn test_read_error_is_surfaced() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::BrokenPipe, "gone"))
            }
        }

        let mut decoder = CsiDecoder::new(Broken);
        assert!(matches!(decoder.next_frame(), Err(DecodeError::Io(_))));
    }
}
