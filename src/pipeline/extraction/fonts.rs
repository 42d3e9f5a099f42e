//! Font-aware decoding of show-text operands.
//!
//! Walks page → /Resources → /Font, then per font: ToUnicode CMap first,
//! then /Encoding (base encoding and /Differences), then Latin-1. Glyph
//! widths come from /Widths (simple fonts) or the descendant's /W (Type0).

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Advance assumed for a glyph whose font carries no width, in glyph-space
/// units (thousandths of an em).
pub const FALLBACK_GLYPH_WIDTH: f64 = 500.0;

/// Parent links followed when looking for inherited page resources.
const MAX_INHERITANCE_DEPTH: usize = 16;

/// One decoded character code.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    /// Advance in glyph-space units.
    pub width: f64,
    /// Single-byte code 32, the only code word spacing applies to.
    pub word_space: bool,
}

/// Fonts of one page, keyed by resource name.
#[derive(Debug, Default)]
pub struct PageFonts {
    fonts: HashMap<Vec<u8>, PdfFont>,
}

impl PageFonts {
    pub fn load(doc: &Document, page_id: ObjectId) -> Self {
        let mut fonts = HashMap::new();
        let Some(entries) = page_font_dict(doc, page_id) else {
            return Self { fonts };
        };
        for (name, obj) in entries.iter() {
            if let Object::Dictionary(dict) = resolve(doc, obj) {
                fonts.insert(name.clone(), PdfFont::load(doc, dict));
            }
        }
        tracing::trace!(fonts = fonts.len(), "Page fonts loaded");
        Self { fonts }
    }

    pub fn get(&self, name: &[u8]) -> Option<&PdfFont> {
        self.fonts.get(name)
    }
}

/// /Resources → /Font of a page, following `Parent` for inherited resources.
fn page_font_dict(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = Some(page_id);
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let id = current?;
        let dict = doc.get_object(id).ok()?.as_dict().ok()?;
        if let Some(Object::Dictionary(resources)) = dict.get(b"Resources").ok().map(|o| resolve(doc, o)) {
            return match resources.get(b"Font").ok().map(|o| resolve(doc, o)) {
                Some(Object::Dictionary(fonts)) => Some(fonts),
                _ => None,
            };
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn stream_bytes(doc: &Document, obj: &Object) -> Option<Vec<u8>> {
    match resolve(doc, obj) {
        Object::Stream(stream) => Some(
            stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()),
        ),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Fonts
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PdfFont {
    /// Type0 fonts read two-byte codes.
    two_byte: bool,
    to_unicode: Option<ToUnicodeMap>,
    /// Simple-font code → character, from the base encoding and /Differences.
    encoding: Option<Box<[Option<char>; 256]>>,
    widths: HashMap<u32, f64>,
    default_width: f64,
}

impl PdfFont {
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let two_byte = matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Type0");
        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| stream_bytes(doc, obj))
            .map(|bytes| ToUnicodeMap::parse(&bytes));

        let mut font = Self {
            two_byte,
            to_unicode,
            encoding: None,
            widths: HashMap::new(),
            default_width: FALLBACK_GLYPH_WIDTH,
        };
        if two_byte {
            font.load_cid_widths(doc, dict);
        } else {
            font.encoding = dict
                .get(b"Encoding")
                .ok()
                .map(|obj| simple_encoding(doc, resolve(doc, obj)));
            font.load_simple_widths(doc, dict);
        }
        font
    }

    fn load_simple_widths(&mut self, doc: &Document, dict: &Dictionary) {
        let first = dict.get(b"FirstChar").ok().and_then(number).unwrap_or(0.0) as u32;
        if let Some(Object::Array(widths)) = dict.get(b"Widths").ok().map(|o| resolve(doc, o)) {
            for (offset, w) in widths.iter().enumerate() {
                if let Some(w) = number(resolve(doc, w)) {
                    self.widths.insert(first + offset as u32, w);
                }
            }
        }
        let missing = match dict.get(b"FontDescriptor").ok().map(|o| resolve(doc, o)) {
            Some(Object::Dictionary(descriptor)) => {
                descriptor.get(b"MissingWidth").ok().and_then(number)
            }
            _ => None,
        };
        if let Some(missing) = missing {
            self.default_width = missing;
        }
    }

    fn load_cid_widths(&mut self, doc: &Document, dict: &Dictionary) {
        let descendant = match dict.get(b"DescendantFonts").ok().map(|o| resolve(doc, o)) {
            Some(Object::Array(fonts)) => fonts.first().map(|o| resolve(doc, o)),
            _ => None,
        };
        let Some(Object::Dictionary(cid_font)) = descendant else {
            return;
        };
        self.default_width = cid_font.get(b"DW").ok().and_then(number).unwrap_or(1000.0);

        let Some(Object::Array(w)) = cid_font.get(b"W").ok().map(|o| resolve(doc, o)) else {
            return;
        };
        // `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < w.len() {
            let Some(start) = number(&w[i]) else { break };
            let start = start as u32;
            match w.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(run)) => {
                    for (offset, width) in run.iter().enumerate() {
                        if let Some(width) = number(width) {
                            self.widths.insert(start + offset as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let (Some(last), Some(width)) = (number(last), w.get(i + 2).and_then(number))
                    else {
                        break;
                    };
                    for code in start..=last as u32 {
                        self.widths.insert(code, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    /// Split a string operand into glyphs.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let step = if self.two_byte { 2 } else { 1 };
        bytes
            .chunks(step)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                Glyph {
                    text: self.text_for(code),
                    width: self.widths.get(&code).copied().unwrap_or(self.default_width),
                    word_space: !self.two_byte && code == 32,
                }
            })
            .collect()
    }

    fn text_for(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|map| map.get(code)) {
            return text.to_string();
        }
        if self.two_byte {
            // Identity CIDs without a map: nothing better than the code itself.
            return char::from_u32(code)
                .filter(|c| !c.is_control())
                .map(String::from)
                .unwrap_or_default();
        }
        let byte = (code & 0xFF) as u8;
        self.encoding
            .as_ref()
            .and_then(|table| table[byte as usize])
            .unwrap_or_else(|| win_ansi(byte))
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Simple-font encodings
// ---------------------------------------------------------------------------

fn simple_encoding(doc: &Document, obj: &Object) -> Box<[Option<char>; 256]> {
    let mut table: Box<[Option<char>; 256]> = Box::new([None; 256]);
    for (code, slot) in table.iter_mut().enumerate() {
        *slot = Some(win_ansi(code as u8));
    }

    let base = match obj {
        Object::Name(name) => Some(name.as_slice()),
        Object::Dictionary(dict) => match dict.get(b"BaseEncoding") {
            Ok(Object::Name(name)) => Some(name.as_slice()),
            _ => None,
        },
        _ => None,
    };
    if base == Some(b"MacRomanEncoding".as_slice()) {
        for (code, slot) in table.iter_mut().enumerate().skip(0x80) {
            *slot = mac_roman(code as u8);
        }
    }

    if let Object::Dictionary(dict) = obj {
        if let Some(Object::Array(differences)) = dict.get(b"Differences").ok().map(|o| resolve(doc, o)) {
            let mut code: usize = 0;
            for item in differences {
                match item {
                    Object::Integer(start) => code = (*start).clamp(0, 255) as usize,
                    Object::Name(glyph) => {
                        if let Some(slot) = table.get_mut(code) {
                            *slot = glyph_name_char(glyph);
                        }
                        code += 1;
                    }
                    _ => {}
                }
            }
        }
    }
    table
}

/// WinAnsi: Latin-1 except for the 0x80–0x9F block.
fn win_ansi(byte: u8) -> char {
    match byte {
        0x80 => '€',
        0x85 => '…',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '•',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x99 => '™',
        other => char::from(other),
    }
}

/// The part of MacRoman transcripts actually use; the rest reads as absent.
fn mac_roman(byte: u8) -> Option<char> {
    Some(match byte {
        0x87 => 'á',
        0x8E => 'é',
        0x92 => 'í',
        0x96 => 'ñ',
        0x97 => 'ó',
        0x9C => 'ú',
        0x9F => 'ü',
        0xA5 => '•',
        0xC9 => '…',
        0xCA => ' ',
        0xD0 => '\u{2013}',
        0xD1 => '\u{2014}',
        0xD2 => '\u{201C}',
        0xD3 => '\u{201D}',
        0xD4 => '\u{2018}',
        0xD5 => '\u{2019}',
        _ => return None,
    })
}

/// Unicode for an Adobe glyph name, covering what transcripts print.
fn glyph_name_char(name: &[u8]) -> Option<char> {
    let name = std::str::from_utf8(name).ok()?;
    if let [c] = name.as_bytes() {
        if c.is_ascii_alphabetic() {
            return Some(char::from(*c));
        }
    }
    if let Some(hex) = name.strip_prefix("uni").filter(|h| h.len() == 4) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    let c = match name {
        "space" | "nbspace" => ' ',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "period" => '.',
        "comma" => ',',
        "colon" => ':',
        "semicolon" => ';',
        "hyphen" | "minus" => '-',
        "plus" => '+',
        "slash" => '/',
        "parenleft" => '(',
        "parenright" => ')',
        "ampersand" => '&',
        "percent" => '%',
        "numbersign" => '#',
        "quotesingle" => '\'',
        "quoteright" => '\u{2019}',
        "quoteleft" => '\u{2018}',
        "endash" => '\u{2013}',
        "emdash" => '\u{2014}',
        "underscore" => '_',
        "equal" => '=',
        "at" => '@',
        "bullet" => '•',
        _ => return None,
    };
    Some(c)
}

// ---------------------------------------------------------------------------
// ToUnicode CMaps
// ---------------------------------------------------------------------------

/// Code → Unicode text from a ToUnicode CMap (`bfchar` and `bfrange`).
#[derive(Debug, Default, PartialEq)]
pub struct ToUnicodeMap {
    map: HashMap<u32, String>,
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Char,
    Range,
}

impl ToUnicodeMap {
    pub fn parse(bytes: &[u8]) -> Self {
        let tokens = tokenize(bytes);
        let mut map = HashMap::new();
        let mut section = Section::None;
        let mut i = 0;

        while i < tokens.len() {
            match (&tokens[i], section) {
                (Token::Word(w), _) if w == "beginbfchar" => section = Section::Char,
                (Token::Word(w), _) if w == "beginbfrange" => section = Section::Range,
                (Token::Word(w), _) if w == "endbfchar" || w == "endbfrange" => {
                    section = Section::None
                }
                (Token::Hex(src), Section::Char) => {
                    if let Some(Token::Hex(dst)) = tokens.get(i + 1) {
                        map.insert(code_of(src), utf16_text(dst));
                        i += 1;
                    }
                }
                (Token::Hex(lo), Section::Range) => {
                    let (lo, hi) = match tokens.get(i + 1) {
                        Some(Token::Hex(hi)) => (code_of(lo), code_of(hi)),
                        _ => {
                            i += 1;
                            continue;
                        }
                    };
                    i += 2;
                    match tokens.get(i) {
                        Some(Token::Hex(dst)) => {
                            let base = utf16_units(dst);
                            for (offset, code) in (lo..=hi).enumerate() {
                                let mut units = base.clone();
                                if let Some(last) = units.last_mut() {
                                    *last = last.wrapping_add(offset as u16);
                                }
                                map.insert(code, String::from_utf16_lossy(&units));
                            }
                        }
                        Some(Token::Open) => {
                            let mut code = lo;
                            while let Some(Token::Hex(dst)) = tokens.get(i + 1) {
                                if code <= hi {
                                    map.insert(code, utf16_text(dst));
                                }
                                code += 1;
                                i += 1;
                            }
                            if matches!(tokens.get(i + 1), Some(Token::Close)) {
                                i += 1;
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            i += 1;
        }

        Self { map }
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn tokenize(bytes: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' if bytes.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if bytes.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let end = bytes[i..].iter().position(|&b| b == b'>').map_or(bytes.len(), |p| i + p);
                let digits: Vec<u8> = bytes[i + 1..end]
                    .iter()
                    .filter(|b| b.is_ascii_hexdigit())
                    .copied()
                    .collect();
                tokens.push(Token::Hex(hex_bytes(&digits)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'%' => {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'<' | b'>' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&bytes[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_value(pair[0]);
            let lo = pair.get(1).map_or(0, |d| hex_value(*d));
            (hi << 4) | lo
        })
        .collect()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}
