//! Loss/Duplicate RLE report block (RFC 3611 §4.1). Chunks are 16-bit
//! symbols in one of three forms: a terminating null chunk (all zero bits),
//! a 15-bit bit-vector chunk (MSB set), or a run-length chunk (MSB clear,
//! next bit the run's symbol, low 14 bits the run length). This mirrors the
//! chunk shapes `rtcp_xr.c` builds in `rtcp_xr_update_seq`/`fill_up_zeros`.
//!
//! [`LossRleEngine`] is the live, per-packet incremental state machine
//! ported from `rtcp_xr_init_seq`/`rtcp_xr_update_seq`/`fill_up_zeros`: it
//! consumes extended sequence numbers one at a time as they arrive (in
//! order, late, or duplicated) and maintains the chunk array directly,
//! rather than building it from a fully-known bitmap after the fact. The
//! free functions below it (`encode_chunk`/`decode_chunk`/`encode_bitmap`/
//! `decode_bitmap`) remain useful for tests and for the batch case where a
//! full loss bitmap is already known.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::marshal::{get_padding, require};

const BIT_VECTOR_WIDTH: usize = 15;
const RUN_LENGTH_MAX: u16 = 0x3FFF; // 14 bits

/// Chunk is a 15-bit bit-vector; bits packed MSB-first starting at bit 14.
const INITIAL_BIT_VECTOR: u16 = 0x8000;
/// All 15 payload bits of a bit-vector chunk set: every offset in range lost.
const ALL_ONE_VECTOR: u16 = 0xffff;
/// Run-length chunk whose run is of 1s rather than 0s.
const RUN_LENGTH_FOR_ONE: u16 = 0x4000;
const RUN_LENGTH_FOR_ONE_MASK: u16 = 0xC000;
const RUN_LENGTH_MASK: u16 = 0x3fff;

const MAX_BIT_IDX: u16 = 15;
const MAX_RUN_LENGTH: u16 = 16380;

/// Ceiling on the number of chunks tracked per reporting interval
/// (`rtcp_xr.h`'s `MAX_CHUNKS`). The chunk array carries two extra slots
/// beyond this so the late/duplicate backward-walk can stage a chunk split
/// that provisionally overflows the limit before the overflow accounting
/// rewinds it.
pub const MAX_CHUNKS: usize = 700;
/// Hard ceiling on `totals` before a reporting interval is forced to close
/// (`rtcp_xr.h`'s `MAX_SEQ_ALLOWED`).
pub const MAX_SEQ_ALLOWED: u32 = 65534;

fn seq_gt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

fn seq_gte(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) >= 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind<'a> {
    /// Terminates the chunk list; any chunks after it are ignored.
    Null,
    /// Up to 15 booleans, MSB-first, `true` meaning "lost".
    BitVector(&'a [bool]),
    /// `run` consecutive packets all sharing `symbol` (`true` = lost).
    RunLength { symbol: bool, run: u16 },
}

pub fn encode_chunk(kind: ChunkKind<'_>) -> u16 {
    match kind {
        ChunkKind::Null => 0,
        ChunkKind::BitVector(bits) => {
            let mut v: u16 = INITIAL_BIT_VECTOR;
            for (i, b) in bits.iter().take(BIT_VECTOR_WIDTH).enumerate() {
                if *b {
                    v |= 1 << (BIT_VECTOR_WIDTH - 1 - i);
                }
            }
            v
        }
        ChunkKind::RunLength { symbol, run } => {
            let run = run.min(RUN_LENGTH_MAX);
            (if symbol { RUN_LENGTH_FOR_ONE } else { 0 }) | run
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedChunk {
    Null,
    BitVector(Vec<bool>),
    RunLength { symbol: bool, run: u16 },
}

pub fn decode_chunk(chunk: u16) -> DecodedChunk {
    if chunk == 0 {
        return DecodedChunk::Null;
    }
    if chunk & INITIAL_BIT_VECTOR != 0 {
        let mut bits = Vec::with_capacity(BIT_VECTOR_WIDTH);
        for i in 0..BIT_VECTOR_WIDTH {
            bits.push(chunk & (1 << (BIT_VECTOR_WIDTH - 1 - i)) != 0);
        }
        DecodedChunk::BitVector(bits)
    } else {
        let symbol = chunk & RUN_LENGTH_FOR_ONE_MASK == RUN_LENGTH_FOR_ONE;
        let run = chunk & RUN_LENGTH_MASK;
        DecodedChunk::RunLength { symbol, run }
    }
}

/// Expand a chunk list back into one bool per sequence offset, `true`
/// meaning lost. Stops at the first null chunk or once `total_len` bits
/// have been produced, whichever comes first.
pub fn decode_bitmap(chunks: &[u16], total_len: usize) -> Vec<bool> {
    let mut out = Vec::with_capacity(total_len);
    for &chunk in chunks {
        if out.len() >= total_len {
            break;
        }
        match decode_chunk(chunk) {
            DecodedChunk::Null => break,
            DecodedChunk::BitVector(bits) => out.extend(bits),
            DecodedChunk::RunLength { symbol, run } => {
                out.extend(std::iter::repeat(symbol).take(run as usize))
            }
        }
    }
    out.truncate(total_len);
    out
}

/// Greedily encode a loss bitmap into the fewest chunks: runs of 15 or more
/// identical bits become a run-length chunk, everything else is packed into
/// 15-bit bit-vector chunks.
pub fn encode_bitmap(bits: &[bool]) -> Vec<u16> {
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < bits.len() {
        let run_len = bits[i..].iter().take_while(|&&b| b == bits[i]).count();
        if run_len >= BIT_VECTOR_WIDTH {
            let mut remaining = run_len;
            while remaining > 0 {
                let run = remaining.min(RUN_LENGTH_MAX as usize) as u16;
                chunks.push(encode_chunk(ChunkKind::RunLength {
                    symbol: bits[i],
                    run,
                }));
                remaining -= run as usize;
            }
            i += run_len;
        } else {
            let end = (i + BIT_VECTOR_WIDTH).min(bits.len());
            chunks.push(encode_chunk(ChunkKind::BitVector(&bits[i..end])));
            i = end;
        }
    }
    chunks
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LossRleReportBlock {
    pub ssrc: u32,
    pub begin_seq: u16,
    pub end_seq: u16,
    pub chunks: Vec<u16>,
}

impl LossRleReportBlock {
    pub(crate) fn content_len(&self) -> usize {
        let raw = 8 + self.chunks.len() * 2;
        raw + get_padding(raw)
    }

    pub(crate) fn marshal_content(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.content_len();
        require(buf, size)?;
        let mut b = &mut buf[..8];
        b.put_u32(self.ssrc);
        b.put_u16(self.begin_seq);
        b.put_u16(self.end_seq);
        let mut n = 8;
        for c in &self.chunks {
            (&mut buf[n..n + 2]).put_u16(*c);
            n += 2;
        }
        for byte in &mut buf[n..size] {
            *byte = 0;
        }
        Ok(size)
    }

    pub(crate) fn unmarshal_content(raw: &[u8]) -> Result<Self> {
        if raw.len() < 8 {
            return Err(Error::PacketTooShort);
        }
        let mut b = &raw[..8];
        let ssrc = b.get_u32();
        let begin_seq = b.get_u16();
        let end_seq = b.get_u16();
        let mut chunks = Vec::new();
        let mut rest = &raw[8..];
        while rest.len() >= 2 {
            let c = u16::from_be_bytes([rest[0], rest[1]]);
            rest = &rest[2..];
            if c == 0 {
                break;
            }
            chunks.push(c);
        }
        Ok(LossRleReportBlock {
            ssrc,
            begin_seq,
            end_seq,
            chunks,
        })
    }
}

/// Incremental Loss RLE builder, one per tracked SSRC per reporting
/// interval. Ported from `rtcp_xr.c`'s `rtcp_xr_stats_t` and the
/// `rtcp_xr_init_seq`/`rtcp_xr_update_seq`/`fill_up_zeros` trio: packets are
/// fed in one at a time via [`update`](Self::update) as they arrive
/// (in-order, with gaps, late, or duplicated) and the chunk array is built
/// up live rather than from an already-complete bitmap.
#[derive(Debug, Clone)]
pub struct LossRleEngine {
    eseq_start: u32,
    totals: u16,
    not_reported: u32,
    before_intvl: u32,
    re_init: u32,
    exceed_limit: bool,
    lost_packets: u32,
    dup_packets: u32,
    late_arrivals: u32,
    next_exp_eseq: u32,
    /// `MAX_CHUNKS + 2`: the trailing two slots absorb a late/duplicate
    /// chunk split that provisionally runs past `max_chunks_allow` before
    /// the overflow accounting below rewinds it.
    chunk: Vec<u16>,
    cur_chunk_in_use: u16,
    max_chunks_allow: u16,
    bit_idx: u8,
}

impl LossRleEngine {
    /// `max_size` is the byte budget for the eventual report block's chunk
    /// list (`rtcp_xr_set_size`); `eseq_start` is the first extended
    /// sequence number of the interval.
    pub fn new(max_size: u16, eseq_start: u32) -> Self {
        let mut engine = LossRleEngine {
            eseq_start: 0,
            totals: 0,
            not_reported: 0,
            before_intvl: 0,
            re_init: 0,
            exceed_limit: false,
            lost_packets: 0,
            dup_packets: 0,
            late_arrivals: 0,
            next_exp_eseq: 0,
            chunk: vec![0u16; MAX_CHUNKS + 2],
            cur_chunk_in_use: 0,
            max_chunks_allow: 0,
            bit_idx: MAX_BIT_IDX as u8,
        };
        engine.set_size(max_size);
        engine.init_seq(eseq_start, false);
        engine
    }

    fn set_size(&mut self, max_size: u16) {
        let max_chunks = max_size / 2; // sizeof(uint16_t)
        self.max_chunks_allow = max_chunks.min(MAX_CHUNKS as u16);
    }

    /// Starts a new reporting interval at `eseq_start`. When `re_init_mode`
    /// is set, `re_init` captures how much of the just-closed interval was
    /// never folded into a chunk (the prior `totals`/`not_reported`/
    /// `before_intvl`), mirroring `rtcp_xr_init_seq`'s re-init bookkeeping.
    pub fn init_seq(&mut self, eseq_start: u32, re_init_mode: bool) {
        self.re_init = if re_init_mode {
            self.totals as u32 + self.not_reported + self.before_intvl
        } else {
            0
        };

        self.eseq_start = eseq_start;
        self.totals = 0;
        self.not_reported = 0;
        self.before_intvl = 0;
        self.exceed_limit = false;
        self.lost_packets = 0;
        self.dup_packets = 0;
        self.late_arrivals = 0;
        self.cur_chunk_in_use = 0;
        self.next_exp_eseq = eseq_start;
        self.bit_idx = MAX_BIT_IDX as u8;

        for c in self.chunk.iter_mut() {
            *c = 0;
        }
        self.chunk[0] = INITIAL_BIT_VECTOR;
    }

    /// Feeds `fill_up_zeros`'s zero-run-splitting logic: `zeros_length`
    /// always enters with `bit_idx == MAX_BIT_IDX`, i.e. the current chunk
    /// is a fresh, empty bit-vector.
    fn fill_up_zeros(&mut self, zeros_length: u16) {
        let multiples = zeros_length / MAX_BIT_IDX;
        let remainder = zeros_length % MAX_BIT_IDX;

        if multiples != 0 {
            self.chunk[self.cur_chunk_in_use as usize] = multiples * MAX_BIT_IDX;
            self.cur_chunk_in_use += 1;

            if self.cur_chunk_in_use == self.max_chunks_allow {
                self.exceed_limit = true;
                self.cur_chunk_in_use -= 1;
                self.bit_idx = 0;
                self.totals = self.totals.wrapping_sub(remainder + 1);
                self.not_reported += (remainder + 1) as u32;
                return;
            }
        }

        self.chunk[self.cur_chunk_in_use as usize] = INITIAL_BIT_VECTOR;
        self.bit_idx -= (remainder + 1) as u8;
        self.chunk[self.cur_chunk_in_use as usize] |= 1u16 << self.bit_idx;

        if self.bit_idx == 0 {
            self.cur_chunk_in_use += 1;
            self.bit_idx = MAX_BIT_IDX as u8;
            self.chunk[self.cur_chunk_in_use as usize] = INITIAL_BIT_VECTOR;
        }
    }

    /// Folds one more extended sequence number into the interval. Ported
    /// from `rtcp_xr_update_seq`'s five cases: before the interval, past
    /// `exceed_limit`, in-order, a gap (loss), and late/duplicate.
    pub fn update(&mut self, eseq: u32) {
        if self.max_chunks_allow == 0 {
            return;
        }

        if seq_gt(self.eseq_start, eseq) {
            self.before_intvl += 1;
            return;
        }

        if self.exceed_limit {
            if seq_gte(eseq, self.next_exp_eseq) {
                self.not_reported += eseq - self.next_exp_eseq + 1;
                self.next_exp_eseq = eseq + 1;
                return;
            } else if seq_gt(eseq, self.eseq_start + self.totals as u32) {
                self.not_reported += 1;
                return;
            }
            // else: eseq still falls inside the already-closed interval,
            // fall through and fold it into the existing chunks.
        }

        let max_chunks = self.max_chunks_allow;
        let mut cidx = self.cur_chunk_in_use;

        if eseq == self.next_exp_eseq {
            self.bit_idx -= 1;
            let bit = self.bit_idx;
            self.chunk[cidx as usize] |= 1u16 << bit;
            self.next_exp_eseq += 1;
            self.totals = self.totals.wrapping_add(1);

            if self.bit_idx == 0 {
                if self.chunk[cidx as usize] == ALL_ONE_VECTOR {
                    let prev_is_extendable = cidx > 0
                        && (self.chunk[cidx as usize - 1] & RUN_LENGTH_FOR_ONE_MASK) == RUN_LENGTH_FOR_ONE
                        && (self.chunk[cidx as usize - 1] & RUN_LENGTH_MASK) < MAX_RUN_LENGTH;
                    if prev_is_extendable {
                        self.chunk[cidx as usize - 1] += MAX_BIT_IDX;
                        self.chunk[cidx as usize] = INITIAL_BIT_VECTOR;
                    } else {
                        self.chunk[cidx as usize] = RUN_LENGTH_FOR_ONE | MAX_BIT_IDX;
                        self.cur_chunk_in_use += 1;
                        self.chunk[self.cur_chunk_in_use as usize] = INITIAL_BIT_VECTOR;
                    }
                } else {
                    self.cur_chunk_in_use += 1;
                    self.chunk[self.cur_chunk_in_use as usize] = INITIAL_BIT_VECTOR;
                }
                self.bit_idx = MAX_BIT_IDX as u8;
            }
        } else if seq_gt(eseq, self.next_exp_eseq) {
            let zeros_length = eseq - self.next_exp_eseq;
            self.next_exp_eseq = eseq + 1;
            self.totals = (eseq.wrapping_sub(self.eseq_start).wrapping_add(1)) as u16;
            self.lost_packets += zeros_length;

            if self.bit_idx == MAX_BIT_IDX as u8 {
                self.fill_up_zeros(zeros_length as u16);
            } else {
                let bit_idx_u32 = self.bit_idx as u32;
                if zeros_length >= bit_idx_u32 {
                    let remaining = zeros_length - bit_idx_u32;
                    self.bit_idx = MAX_BIT_IDX as u8;
                    self.cur_chunk_in_use += 1;

                    if self.cur_chunk_in_use == max_chunks {
                        self.exceed_limit = true;
                        self.cur_chunk_in_use -= 1;
                        self.bit_idx = 0;
                        self.totals = self.totals.wrapping_sub((remaining + 1) as u16);
                        self.not_reported += remaining + 1;
                        return;
                    }
                    self.fill_up_zeros(remaining as u16);
                } else {
                    self.bit_idx -= (zeros_length + 1) as u8;
                    let bit = self.bit_idx;
                    self.chunk[cidx as usize] |= 1u16 << bit;
                    if self.bit_idx == 0 {
                        self.bit_idx = MAX_BIT_IDX as u8;
                        self.cur_chunk_in_use += 1;
                        self.chunk[self.cur_chunk_in_use as usize] = INITIAL_BIT_VECTOR;
                    }
                }
            }
        } else {
            // Late arrival or duplicate: walk backward from the active
            // chunk to find the one covering `eseq`.
            let mut begin_seq: u32 = if self.chunk[cidx as usize] & INITIAL_BIT_VECTOR != 0 {
                self.eseq_start + self.totals as u32 - (MAX_BIT_IDX as u32 - self.bit_idx as u32)
            } else {
                self.eseq_start + self.totals as u32 - (self.chunk[cidx as usize] & RUN_LENGTH_MASK) as u32
            };

            while seq_gt(begin_seq, eseq) {
                cidx -= 1;
                if self.chunk[cidx as usize] & INITIAL_BIT_VECTOR != 0 {
                    begin_seq -= MAX_BIT_IDX as u32;
                } else {
                    begin_seq -= (self.chunk[cidx as usize] & RUN_LENGTH_MASK) as u32;
                }
            }

            if self.chunk[cidx as usize] & INITIAL_BIT_VECTOR != 0 {
                let bidx = MAX_BIT_IDX as u32 - 1 - (eseq - begin_seq);
                if (self.chunk[cidx as usize] >> bidx) & 0x1 != 0 {
                    self.dup_packets += 1;
                } else {
                    self.chunk[cidx as usize] |= 1u16 << bidx;
                    self.lost_packets -= 1;
                    self.late_arrivals += 1;
                }
            } else if (self.chunk[cidx as usize] & RUN_LENGTH_FOR_ONE_MASK) == RUN_LENGTH_FOR_ONE {
                self.dup_packets += 1;
            } else {
                self.split_zero_run(cidx, begin_seq, eseq, max_chunks);
                self.lost_packets -= 1;
                self.late_arrivals += 1;
            }
        }

        if !self.exceed_limit
            && (self.cur_chunk_in_use == self.max_chunks_allow || self.totals as u32 >= MAX_SEQ_ALLOWED)
        {
            self.exceed_limit = true;
            if self.cur_chunk_in_use == self.max_chunks_allow {
                self.cur_chunk_in_use -= 1;
            }
            self.bit_idx = 0;
        }
    }

    /// Splits a run-of-zeros chunk at `cidx` (covering `[begin_seq,
    /// begin_seq + run)`) to mark `eseq` as a late arrival, pushing
    /// subsequent chunks up by one or two slots. Ported from the final
    /// branch of `rtcp_xr_update_seq`.
    fn split_zero_run(&mut self, cidx: u16, begin_seq: u32, eseq: u32, max_chunks: u16) {
        let total_length = (self.cur_chunk_in_use - cidx + 1) as usize;
        let bidx = eseq - begin_seq;
        let c = cidx as usize;
        let mut lost_chunks: i32 = 0;

        if self.chunk[c] == MAX_BIT_IDX {
            self.chunk[c] = INITIAL_BIT_VECTOR;
            self.chunk[c] |= 1u16 << (MAX_BIT_IDX as u32 - bidx - 1);
        } else if bidx < MAX_BIT_IDX as u32 {
            self.chunk.copy_within(c..c + total_length, c + 1);
            self.chunk[c] = INITIAL_BIT_VECTOR;
            self.chunk[c] |= 1u16 << (MAX_BIT_IDX as u32 - bidx - 1);
            self.chunk[c + 1] -= MAX_BIT_IDX;

            if self.cur_chunk_in_use < max_chunks {
                self.cur_chunk_in_use += 1;
                if self.cur_chunk_in_use == max_chunks {
                    lost_chunks = 1;
                }
            }
        } else {
            let bidx2 = begin_seq + self.chunk[c] as u32 - eseq;
            if bidx2 < MAX_BIT_IDX as u32 {
                self.chunk.copy_within(c..c + total_length, c + 1);
                self.chunk[c] = self.chunk[c + 1] - MAX_BIT_IDX;
                self.chunk[c + 1] = INITIAL_BIT_VECTOR;
                self.chunk[c + 1] |= 1u16 << (bidx2 - 1);

                if self.cur_chunk_in_use < max_chunks {
                    self.cur_chunk_in_use += 1;
                    if self.cur_chunk_in_use == max_chunks {
                        lost_chunks = 1;
                    }
                }
            } else {
                self.chunk.copy_within(c..c + total_length, c + 2);

                let num_chunks = (eseq - begin_seq) / MAX_BIT_IDX as u32;
                self.chunk[c] = (num_chunks * MAX_BIT_IDX as u32) as u16;

                let bidx3 = eseq - (begin_seq + self.chunk[c] as u32);
                self.chunk[c + 1] = INITIAL_BIT_VECTOR;
                self.chunk[c + 1] |= 1u16 << (MAX_BIT_IDX as u32 - bidx3 - 1);

                let num_chunks2 = (self.chunk[c + 2] as u32 / MAX_BIT_IDX as u32)
                    .wrapping_sub(num_chunks)
                    .wrapping_sub(1);
                self.chunk[c + 2] = (num_chunks2 * MAX_BIT_IDX as u32) as u16;

                if self.cur_chunk_in_use < max_chunks {
                    self.cur_chunk_in_use += 2;
                }

                lost_chunks = self.cur_chunk_in_use as i32 - max_chunks as i32 + 1;
                if lost_chunks < 0 {
                    lost_chunks = 0;
                }
            }
        }

        if lost_chunks > 0 {
            self.cur_chunk_in_use -= lost_chunks as u16;
            self.exceed_limit = true;
        }

        while lost_chunks > 0 {
            lost_chunks -= 1;
            let idx = max_chunks as usize + lost_chunks as usize;
            let lost_length = if self.chunk[idx] & INITIAL_BIT_VECTOR != 0 {
                MAX_BIT_IDX - self.bit_idx as u16
            } else {
                self.chunk[idx] & RUN_LENGTH_MASK
            };
            self.totals = self.totals.wrapping_sub(lost_length);
            self.not_reported += lost_length as u32;
            if self.chunk[idx] & INITIAL_BIT_VECTOR != 0 {
                self.bit_idx = 0;
            }
        }
    }

    pub fn eseq_start(&self) -> u32 {
        self.eseq_start
    }

    pub fn totals(&self) -> u16 {
        self.totals
    }

    pub fn not_reported(&self) -> u32 {
        self.not_reported
    }

    pub fn before_intvl(&self) -> u32 {
        self.before_intvl
    }

    pub fn re_init(&self) -> u32 {
        self.re_init
    }

    pub fn exceed_limit(&self) -> bool {
        self.exceed_limit
    }

    pub fn lost_packets(&self) -> u32 {
        self.lost_packets
    }

    pub fn dup_packets(&self) -> u32 {
        self.dup_packets
    }

    pub fn late_arrivals(&self) -> u32 {
        self.late_arrivals
    }

    pub fn cur_chunk_in_use(&self) -> u16 {
        self.cur_chunk_in_use
    }

    pub fn max_chunks_allow(&self) -> u16 {
        self.max_chunks_allow
    }

    /// The live chunk list, including the in-progress trailing chunk.
    pub fn chunks(&self) -> &[u16] {
        &self.chunk[..=self.cur_chunk_in_use as usize]
    }

    /// Snapshots the current interval into a wire-ready report block.
    pub fn to_report_block(&self, ssrc: u32) -> LossRleReportBlock {
        LossRleReportBlock {
            ssrc,
            begin_seq: self.eseq_start as u16,
            end_seq: self.eseq_start.wrapping_add(self.totals as u32).wrapping_sub(1) as u16,
            chunks: self.chunks().to_vec(),
        }
    }
}

#[cfg(test)]
mod rle_test {
    use super::*;

    #[test]
    fn bit_vector_roundtrips() {
        let bits = [true, false, false, true, false, false, false, false];
        let chunk = encode_chunk(ChunkKind::BitVector(&bits));
        let decoded = decode_bitmap(&[chunk], bits.len());
        assert_eq!(decoded, bits);
    }

    #[test]
    fn run_length_roundtrips() {
        let chunk = encode_chunk(ChunkKind::RunLength { symbol: true, run: 40 });
        match decode_chunk(chunk) {
            DecodedChunk::RunLength { symbol, run } => {
                assert!(symbol);
                assert_eq!(run, 40);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn encode_bitmap_uses_run_length_for_long_runs() {
        let mut bits = vec![false; 100];
        bits[50] = true;
        let chunks = encode_bitmap(&bits);
        let decoded = decode_bitmap(&chunks, bits.len());
        assert_eq!(decoded, bits);
        // A 100-bit mostly-zero bitmap should compress to far fewer than
        // 100/15 bit-vector chunks.
        assert!(chunks.len() < 10);
    }

    #[test]
    fn encode_bitmap_packs_short_noisy_runs_as_bit_vectors() {
        let bits = vec![true, false, true, false, true, false, true];
        let chunks = encode_bitmap(&bits);
        assert_eq!(chunks.len(), 1);
        assert_eq!(decode_bitmap(&chunks, bits.len()), bits);
    }

    #[test]
    fn report_block_roundtrips() {
        let block = LossRleReportBlock {
            ssrc: 7,
            begin_seq: 100,
            end_seq: 115,
            chunks: encode_bitmap(&[false; 15]),
        };
        let mut buf = vec![0u8; block.content_len()];
        block.marshal_content(&mut buf).unwrap();
        let got = LossRleReportBlock::unmarshal_content(&buf).unwrap();
        assert_eq!(got.ssrc, 7);
        assert_eq!(got.begin_seq, 100);
        assert_eq!(got.end_seq, 115);
    }

    #[test]
    fn in_order_stream_has_no_loss() {
        let mut engine = LossRleEngine::new(240, 1000);
        for seq in 1000..1100 {
            engine.update(seq);
        }
        assert_eq!(engine.totals(), 100);
        assert_eq!(engine.lost_packets(), 0);
        assert!(!engine.exceed_limit());
    }

    #[test]
    fn every_other_packet_missing_is_tallied_as_loss() {
        let mut engine = LossRleEngine::new(240, 1000);
        for seq in 1000..1101 {
            if seq % 2 == 1 {
                engine.update(seq);
            }
        }
        assert_eq!(engine.totals(), 101);
        assert_eq!(engine.lost_packets(), 51);
        assert!(!engine.exceed_limit());
    }

    #[test]
    fn totals_equals_span_of_highest_seen_sequence() {
        let mut engine = LossRleEngine::new(240, 2000);
        for seq in [2000u32, 2001, 2005, 2010] {
            engine.update(seq);
        }
        let max_seq_in_interval = 2010;
        assert_eq!(
            engine.totals() as u32,
            max_seq_in_interval - engine.eseq_start() + 1
        );
    }

    #[test]
    fn small_max_size_overflows_and_sets_exceed_limit() {
        // max_size=120 bytes -> max_chunks_allow = min(120/2, 700) = 60.
        // Feeding a long in-order stream rolls through far more than 60
        // chunks' worth of packets, which must trip `exceed_limit`.
        let mut engine = LossRleEngine::new(120, 0);
        assert_eq!(engine.max_chunks_allow(), 60);
        for seq in 0..65_534u32 {
            engine.update(seq);
        }
        assert!(engine.exceed_limit());
        assert!(engine.cur_chunk_in_use() <= engine.max_chunks_allow());
    }

    #[test]
    fn late_arrival_inside_a_zero_run_is_recovered() {
        let mut engine = LossRleEngine::new(240, 0);
        engine.update(0);
        engine.update(1);
        // 2..50 missing for now.
        engine.update(50);
        assert_eq!(engine.lost_packets(), 48);
        // seq 25 shows up late, inside the run of zeros.
        engine.update(25);
        assert_eq!(engine.lost_packets(), 47);
        assert_eq!(engine.late_arrivals(), 1);
    }

    #[test]
    fn duplicate_packet_is_counted_not_lost() {
        let mut engine = LossRleEngine::new(240, 0);
        engine.update(0);
        engine.update(1);
        engine.update(1);
        assert_eq!(engine.dup_packets(), 1);
        assert_eq!(engine.lost_packets(), 0);
    }

    #[test]
    fn re_init_carries_forward_unreported_counts() {
        let mut engine = LossRleEngine::new(240, 0);
        engine.update(0);
        engine.update(5); // lost 1..4
        let totals_before = engine.totals();
        let not_reported_before = engine.not_reported();
        engine.init_seq(6, true);
        assert_eq!(engine.re_init(), totals_before as u32 + not_reported_before);
        assert_eq!(engine.totals(), 0);
    }

    #[test]
    fn to_report_block_reflects_sequence_range() {
        let mut engine = LossRleEngine::new(240, 100);
        for seq in 100..110 {
            engine.update(seq);
        }
        let block = engine.to_report_block(55);
        assert_eq!(block.ssrc, 55);
        assert_eq!(block.begin_seq, 100);
        assert_eq!(block.end_seq, 109);
        assert!(!block.chunks.is_empty());
    }
}
