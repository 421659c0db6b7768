use ftl_types::{ADDR_EMPTY, Lba};

/// The per-block recovery metadata page (§6), stamped into the block's
/// last physical page on close: reverse LBA map plus the three bitmaps,
/// covered by a CRC so a scan at bring-up can tell a half-written page
/// from a genuine one. Bring-up itself is out of scope (§1) — this crate
/// only builds the page; nothing here reads one back from media.
pub struct RecoveryPage {
    pub nr_lbas: u32,
    pub nr_padded: u32,
    pub lba_array: Vec<Lba>,
    pub sector_bitmap: Vec<u64>,
    pub sync_bitmap: Vec<u64>,
    pub invalid_bitmap: Vec<u64>,
}

impl RecoveryPage {
    /// Serializes the page body (everything the CRC covers) and appends
    /// the CRC32 last, matching "CRC covers everything after itself" read
    /// in reverse: we compute it over the body, then place it at the
    /// front so a reader can split header from payload without knowing
    /// the payload's length up front.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8 + self.lba_array.len() * 8);
        body.extend_from_slice(&self.nr_lbas.to_le_bytes());
        body.extend_from_slice(&self.nr_padded.to_le_bytes());
        body.extend_from_slice(&(self.lba_array.len() as u32).to_le_bytes());
        for lba in &self.lba_array {
            body.extend_from_slice(&lba.to_le_bytes());
        }
        for bitmap in [&self.sector_bitmap, &self.sync_bitmap, &self.invalid_bitmap] {
            body.extend_from_slice(&(bitmap.len() as u32).to_le_bytes());
            for word in bitmap {
                body.extend_from_slice(&word.to_le_bytes());
            }
        }

        let crc = crc32_ieee(&body);
        let mut out = Vec::with_capacity(body.len() + 4);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<RecoveryPage> {
        if bytes.len() < 4 {
            return None;
        }
        let crc = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let body = &bytes[4..];
        if crc32_ieee(body) != crc {
            return None;
        }

        let mut cur = 0usize;
        let take_u32 = |cur: &mut usize| -> Option<u32> {
            let v = u32::from_le_bytes(body.get(*cur..*cur + 4)?.try_into().ok()?);
            *cur += 4;
            Some(v)
        };
        let nr_lbas = take_u32(&mut cur)?;
        let nr_padded = take_u32(&mut cur)?;
        let nr_lba_entries = take_u32(&mut cur)? as usize;

        let mut lba_array = Vec::with_capacity(nr_lba_entries);
        for _ in 0..nr_lba_entries {
            let v = u64::from_le_bytes(body.get(cur..cur + 8)?.try_into().ok()?);
            cur += 8;
            lba_array.push(if v == ADDR_EMPTY { ADDR_EMPTY } else { v });
        }

        let mut read_bitmap = |cur: &mut usize| -> Option<Vec<u64>> {
            let n = take_u32(cur)? as usize;
            let mut words = Vec::with_capacity(n);
            for _ in 0..n {
                let v = u64::from_le_bytes(body.get(*cur..*cur + 8)?.try_into().ok()?);
                *cur += 8;
                words.push(v);
            }
            Some(words)
        };
        let sector_bitmap = read_bitmap(&mut cur)?;
        let sync_bitmap = read_bitmap(&mut cur)?;
        let invalid_bitmap = read_bitmap(&mut cur)?;

        Some(RecoveryPage { nr_lbas, nr_padded, lba_array, sector_bitmap, sync_bitmap, invalid_bitmap })
    }
}

/// Bog-standard reflected CRC-32 (IEEE 802.3 polynomial). Hand-rolled
/// rather than pulling in a crate for one checksum used on a single,
/// infrequently-hit path.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        // "123456789" is the standard CRC-32/IEEE check string.
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn recovery_page_round_trips() {
        let page = RecoveryPage {
            nr_lbas: 2,
            nr_padded: 1,
            lba_array: vec![10, ADDR_EMPTY, 12],
            sector_bitmap: vec![0b111],
            sync_bitmap: vec![0b011],
            invalid_bitmap: vec![0b000],
        };
        let bytes = page.encode();
        let decoded = RecoveryPage::decode(&bytes).unwrap();
        assert_eq!(decoded.nr_lbas, 2);
        assert_eq!(decoded.lba_array, vec![10, ADDR_EMPTY, 12]);
        assert_eq!(decoded.sync_bitmap, vec![0b011]);
    }

    #[test]
    fn corrupted_page_fails_crc() {
        let page = RecoveryPage {
            nr_lbas: 1,
            nr_padded: 0,
            lba_array: vec![5],
            sector_bitmap: vec![1],
            sync_bitmap: vec![1],
            invalid_bitmap: vec![0],
        };
        let mut bytes = page.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(RecoveryPage::decode(&bytes).is_none());
    }
}
