use std::fs;
use std::io;
use std::path::Path;

/// Reads the pixel dimensions an AVIF/HEIF file declares in its `ispe` property boxes.
/// When several are present (alpha planes, thumbnails) the largest wins.
pub fn read_ispe_dimensions(path: &Path) -> io::Result<Option<(u32, u32)>> {
    let data = fs::read(path)?;
    Ok(find_ispe_dimensions(&data))
}

pub fn find_ispe_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let meta = find_box(data, b"meta")?;
    // `meta` is a full box: skip version + flags.
    let iprp = find_box(meta.get(4..)?, b"iprp")?;
    let ipco = find_box(iprp, b"ipco")?;

    let mut best: Option<(u32, u32)> = None;
    for (kind, payload) in BoxIter::new(ipco) {
        if &kind != b"ispe" || payload.len() < 12 {
            continue;
        }
        let width = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let height = u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]);
        let area = u64::from(width) * u64::from(height);
        if best.map_or(true, |(w, h)| area > u64::from(w) * u64::from(h)) {
            best = Some((width, height));
        }
    }
    best.filter(|(w, h)| *w > 0 && *h > 0)
}

fn find_box<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    BoxIter::new(data)
        .find(|(candidate, _)| candidate == kind)
        .map(|(_, payload)| payload)
}

/// Iterates the sibling boxes in `data`, yielding each box type and payload.
struct BoxIter<'a> {
    data: &'a [u8],
    idx: usize,
}

impl<'a> BoxIter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, idx: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        let start = self.idx;
        if start + 8 > data.len() {
            return None;
        }
        let size =
            u32::from_be_bytes([data[start], data[start + 1], data[start + 2], data[start + 3]]);
        let kind = [data[start + 4], data[start + 5], data[start + 6], data[start + 7]];

        let (header_len, total_len): (usize, usize) = match size {
            0 => (8, data.len() - start),
            1 => {
                if start + 16 > data.len() {
                    return None;
                }
                let mut large = [0u8; 8];
                large.copy_from_slice(&data[start + 8..start + 16]);
                (16, usize::try_from(u64::from_be_bytes(large)).ok()?)
            }
            n => (8, usize::try_from(n).ok()?),
        };

        let end = match start.checked_add(total_len) {
            Some(end) if total_len >= header_len && end <= data.len() => end,
            _ => {
                self.idx = data.len();
                return None;
            }
        };

        self.idx = end;
        Some((kind, &data[start + header_len..end]))
    }
}
