//! Character-level diff rendered as two column-aligned lines.
//!
//! Matching uses the Ratcliff/Obershelp scheme: find the longest common
//! block, recurse on both sides of it, and turn the matching blocks into
//! equal/delete/insert/replace opcodes.

use std::collections::{HashMap, HashSet};

/// Padding emitted per missing character.
const PAD: &str = "  ";

/// Sequences at least this long get the popular-element heuristic.
const AUTOJUNK_MIN_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Equal,
    Delete,
    Insert,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: Tag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

/// A matching block: `a[a_start..a_start + size] == b[b_start..b_start + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

pub struct SequenceMatcher {
    a: Vec<char>,
    b: Vec<char>,
    /// Positions of each element of `b`, ascending. Popular elements removed.
    b2j: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    pub fn new(a: &str, b: &str) -> Self {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();

        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let threshold = b.len() / 100 + 1;
            let popular: HashSet<char> = b2j
                .iter()
                .filter(|(_, positions)| positions.len() > threshold)
                .map(|(&c, _)| c)
                .collect();
            for c in popular {
                b2j.remove(&c);
            }
        }

        Self { a, b, b2j }
    }

    /// Longest block in `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Ties go to the block starting earliest in `a`, then earliest in `b`.
    /// Popular elements never start a match but may extend one.
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);

        // j2len[j] = length of the match ending at a[i - 1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next;
        }

        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        Match {
            a_start: best_i,
            b_start: best_j,
            size: best_size,
        }
    }

    /// Non-adjacent matching blocks in order, ending with a zero-size
    /// sentinel at `(len(a), len(b))`.
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            blocks.push(m);
            if alo < m.a_start && blo < m.b_start {
                queue.push((alo, m.a_start, blo, m.b_start));
            }
            if m.a_start + m.size < ahi && m.b_start + m.size < bhi {
                queue.push((m.a_start + m.size, ahi, m.b_start + m.size, bhi));
            }
        }
        blocks.sort();

        let mut collapsed = Vec::with_capacity(blocks.len() + 1);
        let mut current = Match {
            a_start: 0,
            b_start: 0,
            size: 0,
        };
        for m in blocks {
            if current.a_start + current.size == m.a_start && current.b_start + current.size == m.b_start {
                current.size += m.size;
            } else {
                if current.size > 0 {
                    collapsed.push(current);
                }
                current = m;
            }
        }
        if current.size > 0 {
            collapsed.push(current);
        }

        collapsed.push(Match {
            a_start: la,
            b_start: lb,
            size: 0,
        });
        collapsed
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0, 0);
        let mut ops = Vec::new();

        for m in self.matching_blocks() {
            let tag = match (i < m.a_start, j < m.b_start) {
                (true, true) => Some(Tag::Replace),
                (true, false) => Some(Tag::Delete),
                (false, true) => Some(Tag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                ops.push(Opcode {
                    tag,
                    i1: i,
                    i2: m.a_start,
                    j1: j,
                    j2: m.b_start,
                });
            }

            i = m.a_start + m.size;
            j = m.b_start + m.size;
            if m.size > 0 {
                ops.push(Opcode {
                    tag: Tag::Equal,
                    i1: m.a_start,
                    i2: i,
                    j1: m.b_start,
                    j2: j,
                });
            }
        }

        ops
    }

    /// Similarity in `[0, 1]`: twice the matched characters over the total.
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        2.0 * matched as f64 / total as f64
    }

    fn a_slice(&self, from: usize, to: usize) -> String {
        self.a[from..to].iter().collect()
    }

    fn b_slice(&self, from: usize, to: usize) -> String {
        self.b[from..to].iter().collect()
    }
}

/// Render `a` over `b` so that corresponding segments line up.
///
/// Deleted and inserted runs are padded with two spaces per character on
/// the other line. Replaced runs are parenthesised on both lines and the
/// narrower side is centred, any odd unit of padding going right.
pub fn align(a: &str, b: &str) -> String {
    let matcher = SequenceMatcher::new(a, b);
    let mut a_line = String::new();
    let mut b_line = String::new();

    for op in matcher.opcodes() {
        match op.tag {
            Tag::Equal => {
                a_line.push_str(&matcher.a_slice(op.i1, op.i2));
                b_line.push_str(&matcher.b_slice(op.j1, op.j2));
            }
            Tag::Delete => {
                a_line.push_str(&matcher.a_slice(op.i1, op.i2));
                b_line.push_str(&PAD.repeat(op.i2 - op.i1));
            }
            Tag::Insert => {
                a_line.push_str(&PAD.repeat(op.j2 - op.j1));
                b_line.push_str(&matcher.b_slice(op.j1, op.j2));
            }
            Tag::Replace => {
                let a_seg = format!("({})", matcher.a_slice(op.i1, op.i2));
                let b_seg = format!("({})", matcher.b_slice(op.j1, op.j2));
                let width = a_seg.chars().count().max(b_seg.chars().count());
                a_line.push_str(&pad_center(&a_seg, width));
                b_line.push_str(&pad_center(&b_seg, width));
            }
        }
    }

    format!("{a_line}\n{b_line}")
}

fn pad_center(segment: &str, width: usize) -> String {
    let missing = width - segment.chars().count();
    let left = missing / 2;
    let right = missing - left;
    format!("{}{segment}{}", PAD.repeat(left), PAD.repeat(right))
}
