//! Myers O(ND) difference algorithm over arbitrary slices.
//!
//! The middle-snake bisection follows the classic diff-match-patch layout:
//! strip the common prefix and suffix, short-circuit containment and
//! single-element cases, otherwise bisect and recurse on both halves.

/// One step of an edit script turning `old` into `new`.
///
/// Indices always refer to the original (unedited) slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Equal {
        old_index: usize,
        new_index: usize,
        len: usize,
    },
    Delete {
        old_index: usize,
        old_len: usize,
        new_index: usize,
    },
    Insert {
        old_index: usize,
        new_index: usize,
        new_len: usize,
    },
}

impl DiffOp {
    pub fn is_equal(&self) -> bool {
        matches!(self, DiffOp::Equal { .. })
    }

    /// Number of `old` elements consumed by this step.
    pub fn old_len(&self) -> usize {
        match *self {
            DiffOp::Equal { len, .. } => len,
            DiffOp::Delete { old_len, .. } => old_len,
            DiffOp::Insert { .. } => 0,
        }
    }

    /// Number of `new` elements produced by this step.
    pub fn new_len(&self) -> usize {
        match *self {
            DiffOp::Equal { len, .. } => len,
            DiffOp::Delete { .. } => 0,
            DiffOp::Insert { new_len, .. } => new_len,
        }
    }
}

/// Full Myers diff of `old` against `new`.
pub fn diff<T: PartialEq>(old: &[T], new: &[T]) -> Vec<DiffOp> {
    let mut out = Vec::new();
    diff_range(old, 0, new, 0, &mut out);
    normalize(out)
}

/// Cheap diff that only strips the common prefix and suffix and replaces
/// the middle block wholesale.
pub fn diff_affix<T: PartialEq>(old: &[T], new: &[T]) -> Vec<DiffOp> {
    let prefix = common_prefix(old, new);
    let suffix = common_suffix(&old[prefix..], &new[prefix..]);
    let old_mid = old.len() - prefix - suffix;
    let new_mid = new.len() - prefix - suffix;
    let mut out = Vec::with_capacity(4);
    out.push(DiffOp::Equal {
        old_index: 0,
        new_index: 0,
        len: prefix,
    });
    out.push(DiffOp::Delete {
        old_index: prefix,
        old_len: old_mid,
        new_index: prefix,
    });
    out.push(DiffOp::Insert {
        old_index: prefix + old_mid,
        new_index: prefix,
        new_len: new_mid,
    });
    out.push(DiffOp::Equal {
        old_index: prefix + old_mid,
        new_index: prefix + new_mid,
        len: suffix,
    });
    normalize(out)
}

/// Drops empty steps and merges adjacent steps of the same kind.
pub fn normalize(ops: Vec<DiffOp>) -> Vec<DiffOp> {
    let mut result: Vec<DiffOp> = Vec::with_capacity(ops.len());
    for op in ops {
        if op.old_len() == 0 && op.new_len() == 0 {
            continue;
        }
        match (result.last_mut(), op) {
            (Some(DiffOp::Equal { len, .. }), DiffOp::Equal { len: more, .. }) => *len += more,
            (Some(DiffOp::Delete { old_len, .. }), DiffOp::Delete { old_len: more, .. }) => {
                *old_len += more
            }
            (Some(DiffOp::Insert { new_len, .. }), DiffOp::Insert { new_len: more, .. }) => {
                *new_len += more
            }
            _ => result.push(op),
        }
    }
    result
}

/// Length of the common prefix of `a` and `b`.
pub fn common_prefix<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Length of the common suffix of `a` and `b`.
pub fn common_suffix<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

fn find_slice<T: PartialEq>(haystack: &[T], needle: &[T]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn diff_range<T: PartialEq>(
    old: &[T],
    old_off: usize,
    new: &[T],
    new_off: usize,
    out: &mut Vec<DiffOp>,
) {
    let prefix = common_prefix(old, new);
    if prefix > 0 {
        out.push(DiffOp::Equal {
            old_index: old_off,
            new_index: new_off,
            len: prefix,
        });
    }
    let old = &old[prefix..];
    let new = &new[prefix..];
    let (old_off, new_off) = (old_off + prefix, new_off + prefix);

    let suffix = common_suffix(old, new);
    let old_mid = &old[..old.len() - suffix];
    let new_mid = &new[..new.len() - suffix];
    diff_middle(old_mid, old_off, new_mid, new_off, out);
    if suffix > 0 {
        out.push(DiffOp::Equal {
            old_index: old_off + old_mid.len(),
            new_index: new_off + new_mid.len(),
            len: suffix,
        });
    }
}

fn diff_middle<T: PartialEq>(
    old: &[T],
    old_off: usize,
    new: &[T],
    new_off: usize,
    out: &mut Vec<DiffOp>,
) {
    let delete_all = DiffOp::Delete {
        old_index: old_off,
        old_len: old.len(),
        new_index: new_off,
    };
    let insert_all = DiffOp::Insert {
        old_index: old_off + old.len(),
        new_index: new_off,
        new_len: new.len(),
    };
    if old.is_empty() || new.is_empty() {
        out.push(delete_all);
        out.push(insert_all);
        return;
    }

    // Shorter side contained in the longer one.
    if old.len() > new.len() {
        if let Some(idx) = find_slice(old, new) {
            out.push(DiffOp::Delete {
                old_index: old_off,
                old_len: idx,
                new_index: new_off,
            });
            out.push(DiffOp::Equal {
                old_index: old_off + idx,
                new_index: new_off,
                len: new.len(),
            });
            out.push(DiffOp::Delete {
                old_index: old_off + idx + new.len(),
                old_len: old.len() - idx - new.len(),
                new_index: new_off + new.len(),
            });
            return;
        }
    } else if let Some(idx) = find_slice(new, old) {
        out.push(DiffOp::Insert {
            old_index: old_off,
            new_index: new_off,
            new_len: idx,
        });
        out.push(DiffOp::Equal {
            old_index: old_off,
            new_index: new_off + idx,
            len: old.len(),
        });
        out.push(DiffOp::Insert {
            old_index: old_off + old.len(),
            new_index: new_off + idx + old.len(),
            new_len: new.len() - idx - old.len(),
        });
        return;
    }

    if old.len() == 1 || new.len() == 1 {
        out.push(delete_all);
        out.push(insert_all);
        return;
    }

    match bisect(old, new) {
        Some((x, y)) => {
            diff_range(&old[..x], old_off, &new[..y], new_off, out);
            diff_range(&old[x..], old_off + x, &new[y..], new_off + y, out);
        }
        None => {
            out.push(delete_all);
            out.push(insert_all);
        }
    }
}

/// Finds the middle snake; returns the split point `(x, y)`.
fn bisect<T: PartialEq>(c1: &[T], c2: &[T]) -> Option<(usize, usize)> {
    let n1 = c1.len() as i64;
    let n2 = c2.len() as i64;
    let max_d = (n1 + n2 + 1) / 2 + 1;
    let v_offset = max_d;
    let v_length = 2 * max_d;

    let mut v1: Vec<i64> = vec![-1; v_length as usize];
    let mut v2: Vec<i64> = vec![-1; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;

    let delta = n1 - n2;
    let front = delta % 2 != 0;

    let mut k1start = 0i64;
    let mut k1end = 0i64;
    let mut k2start = 0i64;
    let mut k2end = 0i64;

    for d in 0..max_d {
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n1 && y1 < n2 && c1[x1 as usize] == c2[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > n1 {
                k1end += 2;
            } else if y1 > n2 {
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && k2_offset < v_length && v2[k2_offset as usize] != -1 {
                    let x2 = n1 - v2[k2_offset as usize];
                    if x1 >= x2 {
                        return Some((x1 as usize, y1 as usize));
                    }
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n1
                && y2 < n2
                && c1[(n1 - 1 - x2) as usize] == c2[(n2 - 1 - y2) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > n1 {
                k2end += 2;
            } else if y2 > n2 {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && k1_offset < v_length && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    if x1 >= n1 - x2 {
                        return Some((x1 as usize, y1 as usize));
                    }
                }
            }
            k2 += 2;
        }
    }
    None
}

/// Replays `ops` over `old`, pulling inserted elements from `new`.
pub fn apply<T: Clone>(old: &[T], new: &[T], ops: &[DiffOp]) -> Vec<T> {
    let mut out = Vec::with_capacity(new.len());
    for op in ops {
        match *op {
            DiffOp::Equal { old_index, len, .. } => {
                out.extend_from_slice(&old[old_index..old_index + len])
            }
            DiffOp::Delete { .. } => {}
            DiffOp::Insert {
                new_index, new_len, ..
            } => out.extend_from_slice(&new[new_index..new_index + new_len]),
        }
    }
    out
}
