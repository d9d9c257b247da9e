//! Variable width LZW streams
//!
//! The code width is not fixed: each code is packed with exactly as many bits
//! as the dictionary needs at that moment, floored at 9, so the width rises
//! by one bit every time the entry count crosses a power of two.  Both ends
//! track the dictionary identically, which keeps the widths in lockstep
//! without any reset markers in the stream.
//!
//! A stream opens with an ASCII prologue `max_bits:used:name_len:name`
//! followed immediately by the bit-packed codes.  `used` is the pruning
//! threshold (0 disables pruning) and `name`, when present, is a sidecar
//! dictionary file the expander loads before its first code.

use bit_vec::BitVec;
use std::io::{Cursor,Read,Write,BufReader,BufWriter,ErrorKind};
use std::fs::File;
use crate::table::{StringTable,Code,CODE_EMPTY,MINBITS,MAXBITS_ABSOLUTE,bits_per_code};
use crate::tools::stack::Stack;
use crate::{Error,DYNERR};

/// Options controlling compression.  Expansion needs none, every
/// parameter it cares about travels in the stream prologue.
#[derive(Clone)]
pub struct Options {
    /// widest code the dictionary may grow to, silently clamped to [9,20]
    pub max_bits: usize,
    /// prune threshold, entries used fewer times than this are dropped
    /// when the dictionary fills, 0 freezes the dictionary instead
    pub used: usize,
    /// sidecar dictionary file to preload, the name is echoed in the
    /// prologue so the expander can load the same file
    pub preload: Option<String>
}

pub const STD_OPTIONS: Options = Options {
    max_bits: 12,
    used: 0,
    preload: None
};

/// Stages codes into bytes, least significant bit first.
/// Whole bytes are handed to the writer as soon as they form, so no
/// seeking is ever required and the sink can be a pipe.
struct CodeWriter {
    bits: BitVec
}

impl CodeWriter {
    fn new() -> Self {
        Self {
            bits: BitVec::new()
        }
    }
    /// append `num_bits` of `code` and write out every completed byte
    fn put_code<W: Write>(&mut self,num_bits: usize,code: usize,writer: &mut BufWriter<W>) -> Result<(),std::io::Error> {
        for b in 0..num_bits {
            self.bits.push(code >> b & 1 > 0);
        }
        let whole = self.bits.len() / 8;
        if whole > 0 {
            let mut bytes = Vec::with_capacity(whole);
            for i in 0..whole {
                let mut val = 0;
                for b in 0..8 {
                    val |= (self.bits.get(i*8 + b).unwrap() as u8) << b;
                }
                bytes.push(val);
            }
            writer.write_all(&bytes)?;
            let mut tail = BitVec::new();
            for i in whole*8..self.bits.len() {
                tail.push(self.bits.get(i).unwrap());
            }
            self.bits = tail;
        }
        Ok(())
    }
    /// zero pad the last partial byte and write it.  The pad is always
    /// shorter than one code so it reads back as a clean EOF.
    fn flush<W: Write>(&mut self,writer: &mut BufWriter<W>) -> Result<(),std::io::Error> {
        if self.bits.len() > 0 {
            let mut val = 0;
            for b in 0..self.bits.len() {
                val |= (self.bits.get(b).unwrap() as u8) << b;
            }
            writer.write_all(&[val])?;
            self.bits = BitVec::new();
        }
        Ok(())
    }
}

/// Unpacks codes from the byte stream, least significant bit first.
struct CodeReader {
    bits: BitVec,
    ptr: usize
}

impl CodeReader {
    fn new() -> Self {
        Self {
            bits: BitVec::new(),
            ptr: 0
        }
    }
    /// keep the bit vector small, we don't need the bits behind us
    fn drop_leading_bits(&mut self) {
        let cpy = self.bits.clone();
        self.bits = BitVec::new();
        for i in self.ptr..cpy.len() {
            self.bits.push(cpy.get(i).unwrap());
        }
        self.ptr = 0;
    }
    /// Get the next bit, reading from the stream as needed.
    /// `None` means the underlying stream is exhausted.
    fn get_bit<R: Read>(&mut self,reader: &mut BufReader<R>) -> Result<Option<u8>,std::io::Error> {
        match self.bits.get(self.ptr) {
            Some(bit) => {
                self.ptr += 1;
                Ok(Some(bit as u8))
            },
            None => {
                let mut by: [u8;1] = [0];
                match reader.read_exact(&mut by) {
                    Ok(()) => {
                        if self.bits.len() > 512 {
                            self.drop_leading_bits();
                        }
                        for b in 0..8 {
                            self.bits.push(by[0] >> b & 1 > 0);
                        }
                        self.get_bit(reader)
                    },
                    Err(e) if e.kind()==ErrorKind::UnexpectedEof => Ok(None),
                    Err(e) => Err(e)
                }
            }
        }
    }
    /// Read one code of `num_bits`.  EOF inside a code is still EOF, the
    /// flush pad at the end of a stream is always shorter than a code.
    fn get_code<R: Read>(&mut self,num_bits: usize,reader: &mut BufReader<R>) -> Result<Option<usize>,std::io::Error> {
        let mut ans: usize = 0;
        for i in 0..num_bits {
            match self.get_bit(reader)? {
                Some(bit) => ans |= (bit as usize) << i,
                None => return Ok(None)
            }
        }
        Ok(Some(ans))
    }
}

/// Parsed stream prologue.
struct Header {
    max_bits: usize,
    used: usize,
    preload: Option<String>
}

/// read one colon-terminated decimal field, at least one digit required
fn read_header_field<R: Read>(reader: &mut BufReader<R>) -> Result<usize,DYNERR> {
    let mut by: [u8;1] = [0];
    let mut val: usize = 0;
    let mut digits = 0;
    loop {
        if reader.read_exact(&mut by).is_err() {
            return Err(Box::new(Error::InvalidHeader));
        }
        match by[0] {
            b'0'..=b'9' => {
                val = match val.checked_mul(10).and_then(|v| v.checked_add((by[0] - b'0') as usize)) {
                    Some(v) => v,
                    None => return Err(Box::new(Error::InvalidHeader))
                };
                digits += 1;
            },
            b':' if digits > 0 => return Ok(val),
            _ => return Err(Box::new(Error::InvalidHeader))
        }
    }
}

fn parse_header<R: Read>(reader: &mut BufReader<R>) -> Result<Header,DYNERR> {
    let max_bits = read_header_field(reader)?;
    let used = read_header_field(reader)?;
    let name_len = read_header_field(reader)?;
    if max_bits < MINBITS || max_bits > MAXBITS_ABSOLUTE {
        log::error!("header requested {} bit codes",max_bits);
        return Err(Box::new(Error::InvalidHeader));
    }
    let preload = match name_len {
        0 => None,
        n => {
            let mut name = Vec::new();
            let mut by: [u8;1] = [0];
            for _i in 0..n {
                if reader.read_exact(&mut by).is_err() {
                    return Err(Box::new(Error::InvalidHeader));
                }
                name.push(by[0]);
            }
            match String::from_utf8(name) {
                Ok(s) => Some(s),
                Err(_) => return Err(Box::new(Error::InvalidHeader))
            }
        }
    };
    log::debug!("header: {} bit ceiling, prune threshold {}",max_bits,used);
    Ok(Header { max_bits, used, preload })
}

/// Main compression function, reads bytes from `expanded_in` until EOF and
/// writes the prologue and code stream to `compressed_out`.  Returns the
/// final string table so the caller can dump it to a sidecar file.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<StringTable,DYNERR>
where R: Read, W: Write {
    let max_bits = opt.max_bits.clamp(MINBITS,MAXBITS_ABSOLUTE);
    let mut reader = BufReader::new(expanded_in);
    let mut writer = BufWriter::new(compressed_out);
    let mut coder = CodeWriter::new();

    log::debug!("create string table");
    let mut table = StringTable::create();
    match &opt.preload {
        Some(name) => {
            let file = File::open(name).map_err(|_| Error::FileUnavailable(name.clone()))?;
            table.load(BufReader::new(file))?;
            write!(writer,"{}:{}:{}:{}",max_bits,opt.used,name.len(),name)?;
        },
        None => write!(writer,"{}:{}:0:",max_bits,opt.used)?
    }

    let mut code: Code = CODE_EMPTY;
    let mut k_in: [u8;1] = [0];
    loop {
        match reader.read_exact(&mut k_in) {
            Ok(()) => {
                let k = k_in[0];
                match table.lookup_code(code,k) {
                    Some(t) => {
                        // word grows
                        code = t;
                    },
                    None => {
                        // longest match in hand, emit it and learn the extension
                        log::trace!("code: {}",code);
                        coder.put_code(bits_per_code(table.num_entries()),code - 1,&mut writer)?;
                        if bits_per_code(table.num_entries() + 1) <= max_bits {
                            table.insert(code,Some(k));
                            // this insert fit, if the next would not, prune or freeze
                            if opt.used > 0 && bits_per_code(table.num_entries() + 1) > max_bits {
                                table.prune(opt.used);
                            }
                        }
                        code = table.lookup_code(CODE_EMPTY,k).unwrap(); // single bytes always seeded
                    }
                }
                table.increment_usage(code);
            },
            Err(e) if e.kind()==ErrorKind::UnexpectedEof => {
                break;
            },
            Err(e) => return Err(Box::new(e))
        }
    }
    if code != CODE_EMPTY {
        log::trace!("final code: {}",code);
        coder.put_code(bits_per_code(table.num_entries()),code - 1,&mut writer)?;
    }
    coder.flush(&mut writer)?;
    writer.flush()?;
    Ok(table)
}

/// Main expansion function, parses the prologue and replays the code stream
/// from `compressed_in` into bytes on `expanded_out`.  Returns the final
/// string table so the caller can dump it to a sidecar file.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W) -> Result<StringTable,DYNERR>
where R: Read, W: Write {
    let mut reader = BufReader::new(compressed_in);
    let mut writer = BufWriter::new(expanded_out);
    let header = parse_header(&mut reader)?;
    let mut decoder = CodeReader::new();

    log::debug!("create string table");
    let mut table = StringTable::create();
    if let Some(name) = &header.preload {
        let file = File::open(name).map_err(|_| Error::FileUnavailable(name.clone()))?;
        table.load(BufReader::new(file))?;
    }

    let mut stack: Stack<u8> = Stack::create();
    let mut last: Code = CODE_EMPTY;
    let mut final_k: Option<u8> = None;
    loop {
        let wire = match decoder.get_code(bits_per_code(table.num_entries()),&mut reader)? {
            Some(w) => w,
            None => break
        };
        let new_code = wire + 1;
        let mut code = new_code;
        if code > table.num_entries() {
            log::error!("code {} exceeds the {} dictionary entries",code,table.num_entries());
            return Err(Box::new(Error::InvalidCode(code)));
        }
        if table.chr(code).is_none() {
            // the entry we inserted last round came right back before its
            // trailing byte was known, that byte is the first byte of the
            // previous word
            table.increment_usage(code);
            match final_k {
                Some(k) => stack.push(k),
                None => {
                    log::error!("code {} arrived before any word",code);
                    return Err(Box::new(Error::InvalidCode(code)));
                }
            }
            code = table.pref(code);
        }
        // walk the prefix chain, the word comes off in reverse
        loop {
            let pref = table.pref(code);
            if pref == CODE_EMPTY {
                break;
            }
            table.increment_usage(code);
            stack.push(table.chr(code).unwrap()); // interior entries are resolved, should never panic
            code = pref;
        }
        table.increment_usage(code);
        let k0 = table.chr(code).unwrap(); // single byte entry, always resolved
        writer.write_all(&[k0])?;
        while !stack.is_empty() {
            writer.write_all(&[stack.pop()])?;
        }
        log::trace!("word for code {} starts with {}",new_code,k0);
        // the pending entry can now be resolved with this word's first byte
        if last != CODE_EMPTY && table.chr(last).is_none() {
            table.replace_last_char(k0,last);
        }
        final_k = Some(k0);
        if bits_per_code(table.num_entries() + 1) <= header.max_bits {
            let inserted = table.insert(new_code,None);
            if header.used > 0 && bits_per_code(table.num_entries() + 1) > header.max_bits {
                table.prune(header.used);
                // the pending entry never survives a prune
                last = CODE_EMPTY;
            } else {
                last = inserted;
            }
        }
    }
    writer.flush()?;
    Ok(table)
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans)?;
    Ok(ans.into_inner())
}


// *************** TESTS *****************

#[cfg(test)]
fn lcg_bytes(count: usize) -> Vec<u8> {
    // deterministic pseudo random bytes, poorly compressible on purpose
    let mut state: u64 = 0x2545f4914f6cdd1d;
    let mut ans = Vec::with_capacity(count);
    for _i in 0..count {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ans.push((state >> 33) as u8);
    }
    ans
}

#[test]
fn empty_input_is_header_only() {
    let compressed = compress_slice(b"",&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,b"12:0:0:".to_vec());
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,Vec::<u8>::new());
}

#[test]
fn single_byte() {
    // one 9 bit code carrying 'A', the wire value is the internal code minus 1
    let compressed = compress_slice(b"A",&STD_OPTIONS).expect("compression failed");
    let expected = [b"12:0:0:".to_vec(),hex::decode("4100").unwrap()].concat();
    assert_eq!(compressed,expected);
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,b"A".to_vec());
}

#[test]
fn immediate_reuse_of_new_code() {
    // "AAAA" makes the expander consume a code it has not resolved yet:
    // the codes are 65, 256, 65 at 9 bits each
    let compressed = compress_slice(b"AAAA",&STD_OPTIONS).expect("compression failed");
    let expected = [b"12:0:0:".to_vec(),hex::decode("41000601").unwrap()].concat();
    assert_eq!(compressed,expected);
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,b"AAAA".to_vec());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data = "ABABABA".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data = "ababababab".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data = [b'x';5000].to_vec();
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn invertibility_binary() {
    let test_data = lcg_bytes(8192);
    for max_bits in [9,10,12,20] {
        let mut opt = STD_OPTIONS;
        opt.max_bits = max_bits;
        let compressed = compress_slice(&test_data,&opt).expect("compression failed");
        let expanded = expand_slice(&compressed).expect("expansion failed");
        assert_eq!(test_data,expanded);
    }
}

#[test]
fn invertibility_frozen_dictionary() {
    // at 9 bits the dictionary freezes after 255 inserts, the stream must
    // still replay exactly
    let mut opt = STD_OPTIONS;
    opt.max_bits = 9;
    let test_data = lcg_bytes(4096);
    let compressed = compress_slice(&test_data,&opt).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn invertibility_with_pruning() {
    let mut text = String::new();
    for i in 0..120 {
        text += &format!("{} bottles of beer on the wall, take one down, pass it around.\n",120 - i);
    }
    for used in [1,2,5] {
        let mut opt = STD_OPTIONS;
        opt.max_bits = 10;
        opt.used = used;
        let compressed = compress_slice(text.as_bytes(),&opt).expect("compression failed");
        let expanded = expand_slice(&compressed).expect("expansion failed");
        assert_eq!(text.as_bytes().to_vec(),expanded);
    }
}

#[test]
fn invertibility_pruning_binary() {
    let mut opt = STD_OPTIONS;
    opt.max_bits = 10;
    opt.used = 2;
    let test_data = lcg_bytes(8192);
    let compressed = compress_slice(&test_data,&opt).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn sidecar_preload() {
    let temp_dir = tempfile::tempdir().expect("no temp directory");
    let dump_path = temp_dir.path().join("warmup.tab");
    let warmup = "the rain in spain falls mainly on the plain\n".repeat(8);
    let mut src = Cursor::new(warmup.as_bytes());
    let mut sink: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let table = compress(&mut src,&mut sink,&STD_OPTIONS).expect("compression failed");
    let mut dump_file = std::fs::File::create(&dump_path).expect("create failed");
    table.dump(&mut dump_file).expect("dump failed");

    let mut opt = STD_OPTIONS;
    opt.preload = Some(dump_path.to_str().unwrap().to_string());
    let test_data = "the rain in maine falls plainly on the grain\n".repeat(4);
    let compressed = compress_slice(test_data.as_bytes(),&opt).expect("compression failed");
    // the prologue carries the sidecar name so the expander can find it
    let header = format!("12:0:{}:{}",dump_path.to_str().unwrap().len(),dump_path.to_str().unwrap());
    assert!(compressed.starts_with(header.as_bytes()));
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.as_bytes().to_vec(),expanded);
}

#[test]
fn clamps_width_ceiling() {
    let mut opt = STD_OPTIONS;
    opt.max_bits = 50;
    let compressed = compress_slice(b"hello",&opt).expect("compression failed");
    assert!(compressed.starts_with(b"20:"));
    opt.max_bits = 1;
    let compressed = compress_slice(b"hello",&opt).expect("compression failed");
    assert!(compressed.starts_with(b"9:"));
}

#[test]
fn rejects_bad_header() {
    assert!(expand_slice(b"").is_err());
    assert!(expand_slice(b"banana").is_err());
    assert!(expand_slice(b"12:0").is_err());
    // width ceiling outside [9,20]
    assert!(expand_slice(b"8:0:0:").is_err());
    assert!(expand_slice(b"21:0:0:").is_err());
    // named sidecar that cannot be opened
    assert!(expand_slice(b"12:0:7:no.such").is_err());
}

#[test]
fn rejects_invalid_code() {
    // a 9 bit wire value of 300 names code 301, far past the 256 seeded entries
    let compressed = [b"9:0:0:".to_vec(),hex::decode("2c01").unwrap()].concat();
    assert!(expand_slice(&compressed).is_err());
}
