//! Adaptive LZW string table
//!
//! The table owns two coherent indices over the same set of entries: a
//! code-indexed array used while decoding, and a map keyed by
//! `(prefix code, trailing byte)` used while encoding.  Entries may carry an
//! unresolved trailing byte for one iteration of the decoder; such entries are
//! kept out of the pair map until `replace_last_char` resolves them.
//!
//! Pruning rebuilds the table from scratch, keeping only entries whose usage
//! counter meets a threshold.  Codes are renumbered in the process, so both
//! ends of a stream must prune at the same point to stay in lockstep.

use std::collections::HashMap;
use std::io::{BufRead,Write};
use crate::{Error,STDRESULT};
use crate::tools::stack::Stack;

pub type Code = usize;

/// code reserved for the empty string, the prefix of every single-byte entry
pub const CODE_EMPTY: Code = 0;
/// smallest code width ever used on the wire
pub const MINBITS: usize = 9;
/// widest code any table can require
pub const MAXBITS_ABSOLUTE: usize = 20;
/// first code past the 256 single-byte seed entries
pub const FIRST_FREE_CODE: Code = 257;

const MAX_ENTRIES: usize = (1 << MAXBITS_ABSOLUTE) - 1;

struct Entry {
    pref: Code,
    /// trailing byte, `None` while the decoder has not yet learned it
    k: Option<u8>,
    /// how many times this code has been emitted or consumed
    used: usize
}

pub struct StringTable {
    /// indexed by code, slot 0 stands in for `CODE_EMPTY`
    entries: Vec<Entry>,
    /// `(pref,k)` to code, resolved entries only
    pairs: HashMap<(Code,u8),Code>
}

impl StringTable {
    /// Create a table holding the 256 single-byte strings at codes 1 through 256.
    pub fn create() -> Self {
        let mut table = Self {
            entries: vec![Entry { pref: CODE_EMPTY, k: None, used: 0 }],
            pairs: HashMap::new()
        };
        for k in 0..=255 {
            table.insert(CODE_EMPTY,Some(k));
        }
        table
    }
    /// Append a new entry and return its code.  The caller must ensure the
    /// pair does not already exist with a resolved trailing byte.
    pub fn insert(&mut self,pref: Code,k: Option<u8>) -> Code {
        let code = self.entries.len();
        self.entries.push(Entry { pref, k, used: 0 });
        if let Some(k) = k {
            self.pairs.insert((pref,k),code);
        }
        code
    }
    /// Find the code for a resolved `(pref,k)` pair.
    pub fn lookup_code(&self,pref: Code,k: u8) -> Option<Code> {
        self.pairs.get(&(pref,k)).copied()
    }
    pub fn pref(&self,code: Code) -> Code {
        self.entries[code].pref
    }
    /// Trailing byte of an entry, `None` if it has not been resolved yet.
    pub fn chr(&self,code: Code) -> Option<u8> {
        self.entries[code].k
    }
    pub fn increment_usage(&mut self,code: Code) {
        self.entries[code].used += 1;
    }
    /// Resolve a deferred entry: record its trailing byte and install the
    /// pair binding that was withheld at insertion time.
    pub fn replace_last_char(&mut self,new_k: u8,code: Code) {
        let pref = self.entries[code].pref;
        self.entries[code].k = Some(new_k);
        self.pairs.insert((pref,new_k),code);
    }
    pub fn num_entries(&self) -> usize {
        self.entries.len() - 1
    }
    pub fn is_full(&self) -> bool {
        self.num_entries() >= MAX_ENTRIES
    }
    /// Copy the string at `code`, and every prefix of it, into `dst`.
    /// Recipient codes are the smallest available, assigned front to back.
    fn copy_prefixes(&self,code: Code,dst: &mut StringTable) {
        let mut stack: Stack<u8> = Stack::create();
        let mut pref = code;
        while pref != CODE_EMPTY {
            stack.push(self.chr(pref).unwrap()); // chain is resolved, should never panic
            pref = self.pref(pref);
        }
        let first = stack.pop();
        let mut c = dst.lookup_code(CODE_EMPTY,first).unwrap(); // single bytes always seeded
        while !stack.is_empty() {
            let k = stack.pop();
            c = match dst.lookup_code(c,k) {
                Some(t) => t,
                None => dst.insert(c,Some(k))
            };
        }
    }
    /// Rebuild the table keeping only entries used at least `threshold` times.
    /// Survivors generally come back with different codes and their usage
    /// counters start over at zero.
    pub fn prune(&mut self,threshold: usize) {
        let mut fresh = StringTable::create();
        for code in FIRST_FREE_CODE..=self.num_entries() {
            let entry = &self.entries[code];
            if entry.used >= threshold && entry.k.is_some() {
                self.copy_prefixes(code,&mut fresh);
            }
        }
        log::debug!("prune kept {} of {} entries",fresh.num_entries(),self.num_entries());
        *self = fresh;
    }
    /// Write every non-ASCII entry as a `pref:k` line in code order.
    /// A trailing entry with an unresolved byte is left out.
    pub fn dump<W: Write>(&self,out: &mut W) -> STDRESULT {
        let mut end = self.num_entries();
        if end >= FIRST_FREE_CODE && self.chr(end).is_none() {
            end -= 1;
        }
        for code in FIRST_FREE_CODE..=end {
            let entry = &self.entries[code];
            writeln!(out,"{}:{}",entry.pref,entry.k.unwrap())?; // only the last entry can be deferred
        }
        out.flush()?;
        Ok(())
    }
    /// Read back entries in the `dump` format, appending each in file order.
    /// Lines that could not have been produced by `dump` reject the file.
    pub fn load<R: BufRead>(&mut self,reader: R) -> STDRESULT {
        for line in reader.lines() {
            let line = line?;
            let (pref,k) = match line.split_once(':') {
                Some((p,k)) => (p,k),
                None => return Err(Box::new(Error::BadDump))
            };
            let pref = pref.parse::<Code>().map_err(|_| Error::BadDump)?;
            let k = k.parse::<i64>().map_err(|_| Error::BadDump)?;
            if !(0..=255).contains(&k) || pref > self.num_entries() {
                return Err(Box::new(Error::BadDump));
            }
            let k = k as u8;
            if self.lookup_code(pref,k).is_some() {
                // dump never repeats a pair
                return Err(Box::new(Error::BadDump));
            }
            if self.is_full() {
                log::error!("string table overflow, ignoring the rest of the dump");
                break;
            }
            self.insert(pref,Some(k));
        }
        Ok(())
    }
}

/// Number of bits needed to carry any code of a table with `entries` entries,
/// never less than `MINBITS`.
pub fn bits_per_code(entries: usize) -> usize {
    let mut bits = 0;
    let mut n = entries;
    while n >= 1 {
        n >>= 1;
        bits += 1;
    }
    if bits < MINBITS {
        bits = MINBITS;
    }
    bits
}

// *************** TESTS *****************

#[cfg(test)]
fn string_of(table: &StringTable,code: Code) -> Vec<u8> {
    let mut rev = Vec::new();
    let mut c = code;
    while c != CODE_EMPTY {
        rev.push(table.chr(c).unwrap());
        c = table.pref(c);
    }
    rev.iter().rev().map(|x| *x).collect()
}

#[test]
fn seeding() {
    let table = StringTable::create();
    assert_eq!(table.num_entries(),256);
    for k in 0..=255u8 {
        let code = table.lookup_code(CODE_EMPTY,k).unwrap();
        assert_eq!(code,k as usize + 1);
        assert_eq!(table.pref(code),CODE_EMPTY);
        assert_eq!(table.chr(code),Some(k));
    }
}

#[test]
fn insert_and_lookup() {
    let mut table = StringTable::create();
    let ab = table.insert(table.lookup_code(CODE_EMPTY,b'a').unwrap(),Some(b'b'));
    assert_eq!(ab,257);
    assert_eq!(table.num_entries(),257);
    // both indices answer coherently
    assert_eq!(table.lookup_code(table.pref(ab),table.chr(ab).unwrap()),Some(ab));
    assert_eq!(string_of(&table,ab),b"ab".to_vec());
    assert_eq!(table.lookup_code(ab,b'z'),None);
}

#[test]
fn deferred_resolution() {
    let mut table = StringTable::create();
    let a = table.lookup_code(CODE_EMPTY,b'a').unwrap();
    let pending = table.insert(a,None);
    // an unresolved entry is invisible to pair lookup
    assert_eq!(table.chr(pending),None);
    assert_eq!(table.lookup_code(a,b'c'),None);
    table.replace_last_char(b'c',pending);
    assert_eq!(table.chr(pending),Some(b'c'));
    assert_eq!(table.lookup_code(a,b'c'),Some(pending));
}

#[test]
fn prune_keeps_reachable_survivors() {
    let mut table = StringTable::create();
    let a = table.lookup_code(CODE_EMPTY,b'a').unwrap();
    let ab = table.insert(a,Some(b'b'));
    let abc = table.insert(ab,Some(b'c'));
    let x = table.lookup_code(CODE_EMPTY,b'x').unwrap();
    let xy = table.insert(x,Some(b'y'));
    table.increment_usage(abc);
    table.increment_usage(abc);
    table.increment_usage(xy);
    table.prune(2);
    // "abc" survives along with its prefix chain, "xy" does not
    assert_eq!(table.num_entries(),258);
    let new_ab = table.lookup_code(a,b'b').unwrap();
    let new_abc = table.lookup_code(new_ab,b'c').unwrap();
    assert_eq!(string_of(&table,new_abc),b"abc".to_vec());
    assert_eq!(table.lookup_code(x,b'y'),None);
}

#[test]
fn prune_resets_usage() {
    let mut table = StringTable::create();
    let a = table.lookup_code(CODE_EMPTY,b'a').unwrap();
    let ab = table.insert(a,Some(b'b'));
    table.increment_usage(ab);
    table.increment_usage(ab);
    table.prune(1);
    assert_eq!(table.lookup_code(a,b'b'),Some(257));
    table.prune(1);
    // second prune drops it because the counter started over
    assert_eq!(table.lookup_code(a,b'b'),None);
    assert_eq!(table.num_entries(),256);
}

#[test]
fn dump_and_load() {
    let mut table = StringTable::create();
    let t = table.lookup_code(CODE_EMPTY,b't').unwrap();
    let th = table.insert(t,Some(b'h'));
    let the = table.insert(th,Some(b'e'));
    table.insert(the,None); // trailing deferred entry is left out
    let mut dump: Vec<u8> = Vec::new();
    table.dump(&mut dump).expect("dump failed");
    assert_eq!(String::from_utf8(dump.clone()).unwrap(),format!("{}:{}\n{}:{}\n",t,b'h',th,b'e'));

    let mut reloaded = StringTable::create();
    reloaded.load(std::io::Cursor::new(&dump)).expect("load failed");
    assert_eq!(reloaded.num_entries(),258);
    let new_th = reloaded.lookup_code(t,b'h').unwrap();
    assert_eq!(string_of(&reloaded,reloaded.lookup_code(new_th,b'e').unwrap()),b"the".to_vec());
}

#[test]
fn load_rejects_corruption() {
    // negative trailing byte
    let mut table = StringTable::create();
    assert!(table.load(std::io::Cursor::new(b"65:-1\n".to_vec())).is_err());
    // missing separator
    let mut table = StringTable::create();
    assert!(table.load(std::io::Cursor::new(b"257\n".to_vec())).is_err());
    // prefix that does not exist yet, would break the acyclic chain invariant
    let mut table = StringTable::create();
    assert!(table.load(std::io::Cursor::new(b"400:65\n".to_vec())).is_err());
    // duplicate of a seeded pair
    let mut table = StringTable::create();
    assert!(table.load(std::io::Cursor::new(b"0:65\n".to_vec())).is_err());
}

#[test]
fn code_widths() {
    assert_eq!(bits_per_code(1),MINBITS);
    assert_eq!(bits_per_code(256),9);
    assert_eq!(bits_per_code(511),9);
    assert_eq!(bits_per_code(512),10);
    assert_eq!(bits_per_code(1023),10);
    assert_eq!(bits_per_code(1024),11);
    assert_eq!(bits_per_code((1 << MAXBITS_ABSOLUTE) - 1),MAXBITS_ABSOLUTE);
}
