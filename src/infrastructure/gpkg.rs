use thiserror::Error;

/// Problems with a GeoPackage geometry blob header.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("missing 'GP' magic")]
    BadMagic,
    #[error("unsupported GeoPackage binary version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid envelope indicator {0}")]
    InvalidEnvelope(u8),
    #[error("geometry blob truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
}

/// Parsed GeoPackage binary header followed by the WKB payload.
#[derive(Debug, PartialEq, Eq)]
pub struct GpkgGeometry<'a> {
    pub srs_id: i32,
    pub is_empty: bool,
    pub wkb: &'a [u8],
}

const MAGIC: [u8; 2] = *b"GP";
const FIXED_HEADER: usize = 8;

/// Split a GeoPackage geometry blob into header fields and its WKB body.
///
/// Header: magic `GP`, version, flags, srs_id (i32, byte order from flag
/// bit 0), optional envelope sized by flag bits 1..=3.
pub fn parse(blob: &[u8]) -> Result<GpkgGeometry<'_>, GeometryError> {
    if blob.len() < FIXED_HEADER {
        return Err(GeometryError::Truncated {
            needed: FIXED_HEADER,
            actual: blob.len(),
        });
    }
    if blob[..2] != MAGIC {
        return Err(GeometryError::BadMagic);
    }
    if blob[2] != 0 {
        return Err(GeometryError::UnsupportedVersion(blob[2]));
    }

    let flags = blob[3];
    let little_endian = flags & 0x01 != 0;
    let envelope_len = match (flags >> 1) & 0x07 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(GeometryError::InvalidEnvelope(other)),
    };
    let is_empty = flags & 0x10 != 0;

    let srs_bytes = [blob[4], blob[5], blob[6], blob[7]];
    let srs_id = if little_endian {
        i32::from_le_bytes(srs_bytes)
    } else {
        i32::from_be_bytes(srs_bytes)
    };

    let body = FIXED_HEADER + envelope_len;
    if blob.len() < body {
        return Err(GeometryError::Truncated {
            needed: body,
            actual: blob.len(),
        });
    }

    Ok(GpkgGeometry {
        srs_id,
        is_empty,
        wkb: &blob[body..],
    })
}

/// Strip the GeoPackage header, returning an owned WKB buffer.
pub fn to_wkb(blob: &[u8]) -> Result<Vec<u8>, GeometryError> {
    parse(blob).map(|g| g.wkb.to_vec())
}

/// Wrap a WKB buffer in a minimal GeoPackage header (no envelope, little-endian).
pub fn from_wkb(srs_id: i32, wkb: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(FIXED_HEADER + wkb.len());
    blob.extend_from_slice(&MAGIC);
    blob.push(0);
    blob.push(0x01);
    blob.extend_from_slice(&srs_id.to_le_bytes());
    blob.extend_from_slice(wkb);
    blob
}

/// Little-endian ISO WKB for a 2D point.
pub fn point_wkb(x: f64, y: f64) -> Vec<u8> {
    let mut wkb = Vec::with_capacity(21);
    wkb.push(0x01);
    wkb.extend_from_slice(&1u32.to_le_bytes());
    wkb.extend_from_slice(&x.to_le_bytes());
    wkb.extend_from_slice(&y.to_le_bytes());
    wkb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_minimal_header() {
        let wkb = point_wkb(1.0, 2.0);
        let blob = from_wkb(4326, &wkb);
        let g = parse(&blob).unwrap();
        assert_eq!(g.srs_id, 4326);
        assert!(!g.is_empty);
        assert_eq!(g.wkb, wkb.as_slice());
    }

    #[test]
    fn skips_xy_envelope_with_big_endian_srs() {
        let wkb = point_wkb(3.0, 4.0);
        let mut blob = vec![b'G', b'P', 0, 0b0000_0010];
        blob.extend_from_slice(&3857i32.to_be_bytes());
        blob.extend_from_slice(&[0u8; 32]);
        blob.extend_from_slice(&wkb);

        let g = parse(&blob).unwrap();
        assert_eq!(g.srs_id, 3857);
        assert_eq!(to_wkb(&blob).unwrap(), wkb);
    }

    #[test]
    fn xyzm_envelope_is_64_bytes() {
        let mut blob = vec![b'G', b'P', 0, 0b0000_1001];
        blob.extend_from_slice(&0i32.to_le_bytes());
        blob.extend_from_slice(&[0u8; 64]);
        blob.push(0xAA);
        assert_eq!(parse(&blob).unwrap().wkb, &[0xAA]);
    }

    #[test]
    fn empty_flag_is_reported() {
        let mut blob = from_wkb(0, &point_wkb(f64::NAN, f64::NAN));
        blob[3] |= 0x10;
        assert!(parse(&blob).unwrap().is_empty);
    }

    #[test]
    fn rejects_plain_wkb() {
        assert_eq!(parse(&point_wkb(0.0, 0.0)), Err(GeometryError::BadMagic));
    }

    #[test]
    fn rejects_invalid_envelope_code() {
        let mut blob = from_wkb(0, &point_wkb(0.0, 0.0));
        blob[3] = 0b0000_1010;
        assert_eq!(parse(&blob), Err(GeometryError::InvalidEnvelope(5)));
    }

    #[test]
    fn rejects_truncated_envelope() {
        let mut blob = vec![b'G', b'P', 0, 0b0000_0010];
        blob.extend_from_slice(&0i32.to_le_bytes());
        blob.extend_from_slice(&[0u8; 10]);
        assert_eq!(
            parse(&blob),
            Err(GeometryError::Truncated {
                needed: 40,
                actual: 18
            })
        );
    }
}
