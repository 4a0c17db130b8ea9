use crate::{reed_solomon, QrError};

/// Smallest QR Model 2 version (21x21 modules).
pub const MIN_VERSION: u8 = 1;
/// Largest QR Model 2 version (177x177 modules).
pub const MAX_VERSION: u8 = 40;

const PENALTY_N1: u32 = 3;
const PENALTY_N2: u32 = 3;
const PENALTY_N3: u32 = 40;
const PENALTY_N4: u32 = 10;

// Indexed by [tier][version]; column 0 is unused.
#[rustfmt::skip]
const ECC_CODEWORDS_PER_BLOCK: [[u8; 41]; 4] = [
    [0,  7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28, 30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
    [0, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28],
    [0, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30, 30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
    [0, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
];

#[rustfmt::skip]
const NUM_ERROR_CORRECTION_BLOCKS: [[u8; 41]; 4] = [
    [0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4,  4,  4,  4,  4,  6,  6,  6,  6,  7,  8,  8,  9,  9, 10, 12, 12, 12, 13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25],
    [0, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5,  5,  8,  9,  9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21, 23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49],
    [0, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8,  8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29, 34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68],
    [0, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32, 35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81],
];

/// Error-correction tier. Lower tiers trade damage tolerance for capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QrCodeEcc {
    /// Recovers roughly 7% of codewords
    Low,
    /// Recovers roughly 15% of codewords
    Medium,
    /// Recovers roughly 25% of codewords
    Quartile,
    /// Recovers roughly 30% of codewords
    High,
}

impl QrCodeEcc {
    fn ordinal(self) -> usize {
        match self {
            QrCodeEcc::Low => 0,
            QrCodeEcc::Medium => 1,
            QrCodeEcc::Quartile => 2,
            QrCodeEcc::High => 3,
        }
    }

    fn format_bits(self) -> u32 {
        match self {
            QrCodeEcc::Low => 1,
            QrCodeEcc::Medium => 0,
            QrCodeEcc::Quartile => 3,
            QrCodeEcc::High => 2,
        }
    }
}

/// An immutable square grid of dark and light modules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrCode {
    version: u8,
    size: usize,
    ecc: QrCodeEcc,
    mask: u8,
    modules: Vec<bool>,
}

impl QrCode {
    /// Encodes UTF-8 text in byte mode, choosing the smallest version that fits.
    pub fn encode_text(text: &str, ecc: QrCodeEcc) -> Result<Self, QrError> {
        Self::encode_binary(text.as_bytes(), ecc)
    }

    /// Encodes raw bytes in byte mode, choosing the smallest version that fits.
    ///
    /// # Errors
    ///
    /// [`QrError::DataTooLong`] when even version 40 cannot hold `data`.
    pub fn encode_binary(data: &[u8], ecc: QrCodeEcc) -> Result<Self, QrError> {
        let version = (MIN_VERSION..=MAX_VERSION)
            .find(|&v| data.len() <= byte_capacity(v, ecc))
            .ok_or(QrError::DataTooLong {
                len: data.len(),
                capacity: byte_capacity(MAX_VERSION, ecc),
            })?;

        let codewords = data_codewords(data, version, ecc);

        Ok(Self::from_codewords(version, ecc, &codewords))
    }

    fn from_codewords(version: u8, ecc: QrCodeEcc, data: &[u8]) -> Self {
        let size = usize::from(version) * 4 + 17;
        let mut canvas = Canvas::new(size);
        canvas.draw_function_patterns(version, ecc);

        let all_codewords = add_ecc_and_interleave(data, version, ecc);
        canvas.draw_codewords(&all_codewords);

        let mask = (0..8u8)
            .min_by_key(|&mask| {
                let mut trial = canvas.clone();
                trial.apply_mask(mask);
                trial.draw_format_bits(ecc, mask);
                trial.penalty_score()
            })
            .unwrap_or(0);

        canvas.apply_mask(mask);
        canvas.draw_format_bits(ecc, mask);

        QrCode {
            version,
            size,
            ecc,
            mask,
            modules: canvas.modules,
        }
    }

    /// Version number, 1 to 40.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Side length in modules, `version * 4 + 17`.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn ecc(&self) -> QrCodeEcc {
        self.ecc
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Whether the module at column `x`, row `y` is dark. Out-of-range
    /// coordinates read as light.
    pub fn module(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size && self.modules[y * self.size + x]
    }
}

/// Number of payload bytes a byte-mode segment can carry in `version` at `ecc`.
pub fn byte_capacity(version: u8, ecc: QrCodeEcc) -> usize {
    let capacity_bits = num_data_codewords(version, ecc) * 8;
    let header_bits = 4 + char_count_bits(version);
    (capacity_bits - header_bits) / 8
}

fn char_count_bits(version: u8) -> usize {
    if version <= 9 {
        8
    } else {
        16
    }
}

fn num_raw_data_modules(version: u8) -> usize {
    let v = usize::from(version);
    let mut result = (16 * v + 128) * v + 64;
    if v >= 2 {
        let num_align = v / 7 + 2;
        result -= (25 * num_align - 10) * num_align - 55;
        if v >= 7 {
            result -= 36;
        }
    }
    result
}

fn num_data_codewords(version: u8, ecc: QrCodeEcc) -> usize {
    let v = usize::from(version);
    let e = ecc.ordinal();
    num_raw_data_modules(version) / 8
        - usize::from(ECC_CODEWORDS_PER_BLOCK[e][v]) * usize::from(NUM_ERROR_CORRECTION_BLOCKS[e][v])
}

fn alignment_pattern_positions(version: u8) -> Vec<usize> {
    if version == 1 {
        return Vec::new();
    }
    let v = usize::from(version);
    let num_align = v / 7 + 2;
    let step = (v * 8 + num_align * 3 + 5) / (num_align * 4 - 4) * 2;
    let size = v * 4 + 17;

    let mut result: Vec<usize> = (0..num_align - 1).map(|i| size - 7 - i * step).collect();
    result.push(6);
    result.reverse();
    result
}

/// Mode indicator, character count, payload, terminator and pad bytes.
fn data_codewords(data: &[u8], version: u8, ecc: QrCodeEcc) -> Vec<u8> {
    let capacity_bits = num_data_codewords(version, ecc) * 8;

    let mut bits = BitBuffer::default();
    bits.append(0b0100, 4);
    bits.append(data.len() as u32, char_count_bits(version));
    for &b in data {
        bits.append(u32::from(b), 8);
    }

    let terminator = (capacity_bits - bits.len()).min(4);
    bits.append(0, terminator);
    let to_byte = (8 - bits.len() % 8) % 8;
    bits.append(0, to_byte);

    let mut bytes = bits.into_bytes();
    for &pad in [0xEC, 0x11].iter().cycle() {
        if bytes.len() * 8 >= capacity_bits {
            break;
        }
        bytes.push(pad);
    }
    bytes
}

fn add_ecc_and_interleave(data: &[u8], version: u8, ecc: QrCodeEcc) -> Vec<u8> {
    let v = usize::from(version);
    let e = ecc.ordinal();
    let num_blocks = usize::from(NUM_ERROR_CORRECTION_BLOCKS[e][v]);
    let block_ecc_len = usize::from(ECC_CODEWORDS_PER_BLOCK[e][v]);
    let raw_codewords = num_raw_data_modules(version) / 8;
    let num_short_blocks = num_blocks - raw_codewords % num_blocks;
    let short_block_len = raw_codewords / num_blocks;

    let divisor = reed_solomon::divisor(block_ecc_len);
    let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(num_blocks);
    let mut k = 0;
    for i in 0..num_blocks {
        let data_len = short_block_len - block_ecc_len + usize::from(i >= num_short_blocks);
        let mut block = data[k..k + data_len].to_vec();
        k += data_len;
        let ecc = reed_solomon::remainder(&block, &divisor);
        // short blocks get a placeholder so every block has the same length
        if i < num_short_blocks {
            block.push(0);
        }
        block.extend_from_slice(&ecc);
        blocks.push(block);
    }

    let mut result = Vec::with_capacity(raw_codewords);
    for i in 0..blocks[0].len() {
        for (j, block) in blocks.iter().enumerate() {
            if i != short_block_len - block_ecc_len || j >= num_short_blocks {
                result.push(block[i]);
            }
        }
    }
    result
}

fn bit(x: u32, i: usize) -> bool {
    (x >> i) & 1 != 0
}

#[derive(Default)]
struct BitBuffer(Vec<bool>);

impl BitBuffer {
    fn append(&mut self, value: u32, len: usize) {
        for i in (0..len).rev() {
            self.0.push(bit(value, i));
        }
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn into_bytes(self) -> Vec<u8> {
        self.0
            .chunks(8)
            .map(|chunk| chunk.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b)))
            .collect()
    }
}

/// Working grid that tracks which modules belong to function patterns.
#[derive(Clone)]
struct Canvas {
    size: usize,
    modules: Vec<bool>,
    is_function: Vec<bool>,
}

impl Canvas {
    fn new(size: usize) -> Self {
        Canvas {
            size,
            modules: vec![false; size * size],
            is_function: vec![false; size * size],
        }
    }

    fn get(&self, x: usize, y: usize) -> bool {
        self.modules[y * self.size + x]
    }

    fn set_function(&mut self, x: usize, y: usize, dark: bool) {
        let idx = y * self.size + x;
        self.modules[idx] = dark;
        self.is_function[idx] = true;
    }

    fn draw_function_patterns(&mut self, version: u8, ecc: QrCodeEcc) {
        let size = self.size;

        // timing patterns
        for i in 0..size {
            self.set_function(6, i, i % 2 == 0);
            self.set_function(i, 6, i % 2 == 0);
        }

        self.draw_finder_pattern(3, 3);
        self.draw_finder_pattern(size - 4, 3);
        self.draw_finder_pattern(3, size - 4);

        let positions = alignment_pattern_positions(version);
        let n = positions.len();
        for i in 0..n {
            for j in 0..n {
                // the three corners already hold finder patterns
                if (i == 0 && j == 0) || (i == 0 && j == n - 1) || (i == n - 1 && j == 0) {
                    continue;
                }
                self.draw_alignment_pattern(positions[i], positions[j]);
            }
        }

        // placeholder format bits so codeword placement skips them
        self.draw_format_bits(ecc, 0);
        self.draw_version(version);
    }

    fn draw_finder_pattern(&mut self, x: usize, y: usize) {
        let size = self.size as isize;
        for dy in -4isize..=4 {
            for dx in -4isize..=4 {
                let xx = x as isize + dx;
                let yy = y as isize + dy;
                if (0..size).contains(&xx) && (0..size).contains(&yy) {
                    let dist = dx.abs().max(dy.abs());
                    self.set_function(xx as usize, yy as usize, dist != 2 && dist != 4);
                }
            }
        }
    }

    fn draw_alignment_pattern(&mut self, x: usize, y: usize) {
        for dy in -2isize..=2 {
            for dx in -2isize..=2 {
                let xx = (x as isize + dx) as usize;
                let yy = (y as isize + dy) as usize;
                self.set_function(xx, yy, dx.abs().max(dy.abs()) != 1);
            }
        }
    }

    fn draw_format_bits(&mut self, ecc: QrCodeEcc, mask: u8) {
        let data = (ecc.format_bits() << 3) | u32::from(mask);
        let mut rem = data;
        for _ in 0..10 {
            rem = (rem << 1) ^ ((rem >> 9) * 0x537);
        }
        let bits = ((data << 10) | rem) ^ 0x5412;

        // first copy, around the top-left finder
        for i in 0..6 {
            self.set_function(8, i, bit(bits, i));
        }
        self.set_function(8, 7, bit(bits, 6));
        self.set_function(8, 8, bit(bits, 7));
        self.set_function(7, 8, bit(bits, 8));
        for i in 9..15 {
            self.set_function(14 - i, 8, bit(bits, i));
        }

        // second copy, split between the other two finders
        let size = self.size;
        for i in 0..8 {
            self.set_function(size - 1 - i, 8, bit(bits, i));
        }
        for i in 8..15 {
            self.set_function(8, size - 15 + i, bit(bits, i));
        }
        self.set_function(8, size - 8, true);
    }

    fn draw_version(&mut self, version: u8) {
        if version < 7 {
            return;
        }
        let v = u32::from(version);
        let mut rem = v;
        for _ in 0..12 {
            rem = (rem << 1) ^ ((rem >> 11) * 0x1F25);
        }
        let bits = (v << 12) | rem;

        let size = self.size;
        for i in 0..18 {
            let dark = bit(bits, i);
            let a = size - 11 + i % 3;
            let b = i / 3;
            self.set_function(a, b, dark);
            self.set_function(b, a, dark);
        }
    }

    /// Zig-zag placement of codeword bits over the non-function modules.
    fn draw_codewords(&mut self, data: &[u8]) {
        let size = self.size;
        let total_bits = data.len() * 8;
        let mut i = 0;
        let mut right = size - 1;
        loop {
            if right == 6 {
                right = 5;
            }
            for vert in 0..size {
                for j in 0..2 {
                    let x = right - j;
                    let upward = ((right + 1) & 2) == 0;
                    let y = if upward { size - 1 - vert } else { vert };
                    let idx = y * size + x;
                    if !self.is_function[idx] && i < total_bits {
                        self.modules[idx] = bit(u32::from(data[i >> 3]), 7 - (i & 7));
                        i += 1;
                    }
                }
            }
            if right < 3 {
                break;
            }
            right -= 2;
        }
    }

    /// XORs the mask pattern over data modules. Applying it twice undoes it.
    fn apply_mask(&mut self, mask: u8) {
        let size = self.size;
        for y in 0..size {
            for x in 0..size {
                let invert = match mask {
                    0 => (x + y) % 2 == 0,
                    1 => y % 2 == 0,
                    2 => x % 3 == 0,
                    3 => (x + y) % 3 == 0,
                    4 => (x / 3 + y / 2) % 2 == 0,
                    5 => x * y % 2 + x * y % 3 == 0,
                    6 => (x * y % 2 + x * y % 3) % 2 == 0,
                    _ => ((x + y) % 2 + x * y % 3) % 2 == 0,
                };
                let idx = y * size + x;
                self.modules[idx] ^= invert && !self.is_function[idx];
            }
        }
    }

    fn penalty_score(&self) -> u32 {
        let size = self.size;
        let mut score = 0;

        for line in 0..size {
            let row: Vec<bool> = (0..size).map(|x| self.get(x, line)).collect();
            let column: Vec<bool> = (0..size).map(|y| self.get(line, y)).collect();
            score += line_penalty(&row) + line_penalty(&column);
        }

        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color = self.get(x, y);
                if color == self.get(x + 1, y)
                    && color == self.get(x, y + 1)
                    && color == self.get(x + 1, y + 1)
                {
                    score += PENALTY_N2;
                }
            }
        }

        let dark = self.modules.iter().filter(|&&m| m).count() as i64;
        let total = (size * size) as i64;
        let k = (((dark * 20 - total * 10).abs() + total - 1) / total - 1).max(0);
        score + k as u32 * PENALTY_N4
    }
}

/// Same-colour runs of five or more, plus finder-like 1:1:3:1:1 sequences.
fn line_penalty(line: &[bool]) -> u32 {
    const FINDER_LIKE: [[bool; 11]; 2] = [
        [true, false, true, true, true, false, true, false, false, false, false],
        [false, false, false, false, true, false, true, true, true, false, true],
    ];

    let mut score = 0;
    let mut run = 1;
    for i in 1..=line.len() {
        if i < line.len() && line[i] == line[i - 1] {
            run += 1;
        } else {
            if run >= 5 {
                score += PENALTY_N1 + (run - 5);
            }
            run = 1;
        }
    }

    for window in line.windows(11) {
        if FINDER_LIKE.iter().any(|pattern| window == pattern) {
            score += PENALTY_N3;
        }
    }
    score
}
