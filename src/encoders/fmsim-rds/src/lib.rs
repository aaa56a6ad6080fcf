// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! RDS group generation and baseband synthesis at 228 kHz.
//!
//! Groups follow the pattern 0A, 0A, 0A, 0A, 2A with a 4A clock-time group
//! inserted whenever the minute changes. Each group is 104 bits, each bit
//! 192 samples; bits are differentially encoded, shaped with a biphase
//! kernel and modulated onto 57 kHz (a quarter of the sample rate).

use std::f64::consts::PI;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike};
use fmsim_dsp::RingBuffer;
use tracing::{debug, trace};

pub const PS_LENGTH: usize = 8;
pub const RT_LENGTH: usize = 64;
pub const GROUP_LENGTH: usize = 4;
const BLOCK_BITS: usize = 16;
const CHECK_BITS: usize = 10;
pub const BITS_PER_GROUP: usize = GROUP_LENGTH * (BLOCK_BITS + CHECK_BITS);
pub const SAMPLES_PER_BIT: usize = 192;
pub const FILTER_SIZE: usize = 576;
const SAMPLE_BUFFER_SIZE: usize = SAMPLES_PER_BIT + FILTER_SIZE;
const RDS_SAMPLE_RATE: f64 = 228_000.0;
/// Bandwidth of the pulse-shaping lowpass.
const SHAPING_CUTOFF_HZ: f64 = 2_400.0;
const SHAPING_HALF_SPAN: usize = 240;

const RDS_POLY: u16 = 0x1B9;

const OFFSET_A: u16 = 0x0FC;
const OFFSET_B: u16 = 0x198;
const OFFSET_C: u16 = 0x168;
const OFFSET_D: u16 = 0x1B4;
/// Offset words for block positions A, B, C, D. C' is never emitted.
pub const OFFSET_WORDS: [u16; GROUP_LENGTH] = [OFFSET_A, OFFSET_B, OFFSET_C, OFFSET_D];

/// Group pattern length: four 0A groups then one 2A.
const GROUP_CYCLE: u8 = 5;

// ---------------------------------------------------------------------------
// Block coding
// ---------------------------------------------------------------------------

/// 10-bit CRC of a 16-bit block, generator x^10+x^8+x^7+x^5+x^4+x^3+1.
pub fn crc10(data: u16) -> u16 {
    let mut reg = u32::from(data) << 10;
    let poly = u32::from(RDS_POLY);
    for shift in (10..=25).rev() {
        if (reg & (1 << shift)) != 0 {
            reg ^= poly << (shift - 10);
        }
    }
    (reg & 0x03ff) as u16
}

/// Check word transmitted after the block at `position` (0 = A .. 3 = D).
pub fn check_word(data: u16, position: usize) -> u16 {
    crc10(data) ^ OFFSET_WORDS[position]
}

/// Expand a group into its 104 transmitted bits, data then check word for
/// each block, MSB first.
pub fn group_bits(blocks: &[u16; GROUP_LENGTH]) -> [u8; BITS_PER_GROUP] {
    let mut bits = [0u8; BITS_PER_GROUP];
    let mut pos = 0;
    for (i, &block) in blocks.iter().enumerate() {
        let check = check_word(block, i);
        for b in (0..BLOCK_BITS).rev() {
            bits[pos] = ((block >> b) & 1) as u8;
            pos += 1;
        }
        for b in (0..CHECK_BITS).rev() {
            bits[pos] = ((check >> b) & 1) as u8;
            pos += 1;
        }
    }
    bits
}

/// Program identification code derived from a four-letter call sign.
///
/// Letters count from 'A' = 0. Call signs starting with 'K' map from 4096,
/// all others from 21672.
pub fn call_sign_to_pi(call_sign: &str) -> u16 {
    let letters: Vec<u16> = call_sign
        .bytes()
        .take(4)
        .map(|b| u16::from(b.to_ascii_uppercase().saturating_sub(b'A')).min(25))
        .collect();
    let letter = |i: usize| letters.get(i).copied().unwrap_or(0);
    let base = if call_sign.as_bytes().first().map(u8::to_ascii_uppercase) == Some(b'K') {
        4096
    } else {
        21672
    };
    base + 26 * 26 * letter(1) + 26 * letter(2) + letter(3)
}

fn sanitize_text_byte(byte: u8) -> u8 {
    if (0x20..=0x7e).contains(&byte) {
        byte
    } else {
        b' '
    }
}

fn fill_text<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (slot, byte) in out.iter_mut().zip(text.bytes()) {
        *slot = sanitize_text_byte(byte);
    }
    out
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Data carried by the RDS stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdsContent {
    pub pi: u16,
    /// Traffic announcement flag.
    pub ta: bool,
    ps: [u8; PS_LENGTH],
    rt: [u8; RT_LENGTH],
}

impl RdsContent {
    pub fn new(pi: u16, ps: &str, rt: &str) -> Self {
        Self {
            pi,
            ta: false,
            ps: fill_text(ps),
            rt: fill_text(rt),
        }
    }

    /// Station name, space padded to 8 characters.
    pub fn set_ps(&mut self, ps: &str) {
        self.ps = fill_text(ps);
    }

    /// Radio text, space padded to 64 characters.
    pub fn set_rt(&mut self, rt: &str) {
        self.rt = fill_text(rt);
    }

    pub fn ps(&self) -> &[u8; PS_LENGTH] {
        &self.ps
    }

    pub fn rt(&self) -> &[u8; RT_LENGTH] {
        &self.rt
    }
}

/// Where clock-time groups take their time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Never send clock-time groups.
    Disabled,
    /// Local system time.
    System,
    /// A fixed instant, for reproducible output.
    Fixed(DateTime<FixedOffset>),
}

impl ClockSource {
    fn now(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            ClockSource::Disabled => None,
            ClockSource::System => {
                let now = Local::now();
                let offset = *now.offset();
                Some(now.with_timezone(&offset))
            }
            ClockSource::Fixed(at) => Some(*at),
        }
    }
}

/// Blocks B, C and D of a 4A clock-time group for `at`.
pub fn clock_time_blocks(at: &DateTime<FixedOffset>) -> [u16; 3] {
    let utc = at.naive_utc();
    let year = utc.year() - 1900;
    let mon = utc.month0() as i32;
    let l = i32::from(mon <= 1);
    let mjd = 14956
        + utc.day() as i32
        + ((year - l) as f64 * 365.25) as i32
        + ((mon + 2 + l * 12) as f64 * 30.6001) as i32;
    let hour = utc.hour() as i32;
    let minute = utc.minute() as i32;

    let b = 0x4400 | (mjd >> 15);
    let c = (mjd << 1) | (hour >> 4);
    let half_hours = at.offset().local_minus_utc() / (30 * 60);
    let mut d = ((hour & 0xF) << 12) | (minute << 6) | half_hours.abs();
    if half_hours < 0 {
        d |= 0x20;
    }
    [b as u16, c as u16, d as u16]
}

// ---------------------------------------------------------------------------
// Biphase kernel
// ---------------------------------------------------------------------------

/// Windowed-sinc lowpass tap at offset `n` from the center.
fn shaping_tap(n: isize) -> f64 {
    let half = SHAPING_HALF_SPAN as isize;
    if n.abs() > half {
        return 0.0;
    }
    let fc = SHAPING_CUTOFF_HZ / RDS_SAMPLE_RATE;
    let x = n as f64;
    let sinc = if n == 0 {
        2.0 * fc
    } else {
        (2.0 * PI * fc * x).sin() / (PI * x)
    };
    let window = 0.5 * (1.0 + (PI * x / (half + 1) as f64).cos());
    sinc * window
}

/// Shaped response to one biphase symbol: a positive impulse followed half
/// a bit later by a negative one. Peak magnitude is normalized to 1.
fn biphase_kernel() -> &'static [f32] {
    static KERNEL: OnceLock<Vec<f32>> = OnceLock::new();
    KERNEL.get_or_init(|| {
        let first = SHAPING_HALF_SPAN as isize;
        let second = first + (SAMPLES_PER_BIT / 2) as isize;
        let raw: Vec<f64> = (0..FILTER_SIZE as isize)
            .map(|k| shaping_tap(k - first) - shaping_tap(k - second))
            .collect();
        let peak = raw.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        raw.into_iter().map(|v| (v / peak) as f32).collect()
    })
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Stateful RDS baseband generator. One per transmitter.
#[derive(Debug, Clone)]
pub struct RdsEncoder {
    content: RdsContent,
    clock: ClockSource,
    bits: [u8; BITS_PER_GROUP],
    bit_pos: usize,
    /// Last transmitted differential bit.
    prev_output: u8,
    sample_count: usize,
    envelope: RingBuffer<f32>,
    /// 57 kHz carrier phase, in quarter periods.
    phase: u8,
    latest_minute: Option<u32>,
    group_state: u8,
    ps_state: u8,
    rt_state: u8,
}

impl RdsEncoder {
    pub fn new(content: RdsContent) -> Self {
        biphase_kernel();
        Self {
            content,
            clock: ClockSource::System,
            bits: [0; BITS_PER_GROUP],
            bit_pos: BITS_PER_GROUP,
            prev_output: 0,
            sample_count: SAMPLES_PER_BIT,
            envelope: RingBuffer::new(SAMPLE_BUFFER_SIZE),
            phase: 0,
            latest_minute: None,
            group_state: 0,
            ps_state: 0,
            rt_state: 0,
        }
    }

    /// Encoder for a station identified by its call sign.
    pub fn for_station(call_sign: &str, ps: &str, rt: &str) -> Self {
        let pi = call_sign_to_pi(call_sign);
        debug!("RDS PI for {} is {:04X}", call_sign, pi);
        Self::new(RdsContent::new(pi, ps, rt))
    }

    pub fn with_clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_clock(&mut self, clock: ClockSource) {
        self.clock = clock;
    }

    pub fn content(&self) -> &RdsContent {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut RdsContent {
        &mut self.content
    }

    fn clock_time_group(&mut self, blocks: &mut [u16; GROUP_LENGTH]) -> bool {
        let Some(now) = self.clock.now() else {
            return false;
        };
        let minute = now.naive_utc().minute();
        if self.latest_minute == Some(minute) {
            return false;
        }
        self.latest_minute = Some(minute);
        let [b, c, d] = clock_time_blocks(&now);
        blocks[1] = b;
        blocks[2] = c;
        blocks[3] = d;
        trace!("RDS CT group {:04X} {:04X} {:04X}", b, c, d);
        true
    }

    /// Produce the next group's four blocks and advance the rotation.
    pub fn next_group(&mut self) -> [u16; GROUP_LENGTH] {
        let mut blocks = [self.content.pi, 0, 0, 0];
        if self.clock_time_group(&mut blocks) {
            return blocks;
        }

        if self.group_state < GROUP_CYCLE - 1 {
            let ps = &self.content.ps;
            let i = usize::from(self.ps_state) * 2;
            blocks[1] = 0x0400 | u16::from(self.ps_state);
            if self.content.ta {
                blocks[1] |= 0x0010;
            }
            // no alternative frequencies
            blocks[2] = 0xCDCD;
            blocks[3] = u16::from_be_bytes([ps[i], ps[i + 1]]);
            self.ps_state = (self.ps_state + 1) % 4;
        } else {
            let rt = &self.content.rt;
            let i = usize::from(self.rt_state) * 4;
            blocks[1] = 0x2400 | u16::from(self.rt_state);
            blocks[2] = u16::from_be_bytes([rt[i], rt[i + 1]]);
            blocks[3] = u16::from_be_bytes([rt[i + 2], rt[i + 3]]);
            self.rt_state = (self.rt_state + 1) % 16;
        }
        self.group_state = (self.group_state + 1) % GROUP_CYCLE;
        blocks
    }

    fn start_bit(&mut self) {
        if self.bit_pos >= BITS_PER_GROUP {
            let blocks = self.next_group();
            self.bits = group_bits(&blocks);
            self.bit_pos = 0;
        }
        let output = self.prev_output ^ self.bits[self.bit_pos];
        self.prev_output = output;
        let sign = if output == 1 { -1.0 } else { 1.0 };
        // The symbol starts one sample after the one about to be read.
        for (k, &v) in biphase_kernel().iter().enumerate() {
            self.envelope.add_at(1 + k, sign * v);
        }
        self.bit_pos += 1;
        self.sample_count = 0;
    }

    /// Write the next `out.len()` RDS samples (57 kHz modulated).
    pub fn fill(&mut self, out: &mut [f32]) {
        for y in out.iter_mut() {
            if self.sample_count >= SAMPLES_PER_BIT {
                self.start_bit();
            }
            let env = self.envelope.take_front();
            *y = match self.phase {
                1 => env,
                3 => -env,
                _ => 0.0,
            };
            self.phase = (self.phase + 1) % 4;
            self.sample_count += 1;
        }
    }
}
