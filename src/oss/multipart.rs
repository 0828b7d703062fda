use crate::oss::xml::escape;

pub const MAX_PARTS: u64 = 10_000;
pub const MIN_PART_SIZE: u64 = 100 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based, as OSS numbers parts.
    pub number: u32,
    pub offset: u64,
    pub len: u64,
}

/// Splits `size` bytes into parts of `part_size`, growing the part size
/// when needed to stay within [`MAX_PARTS`].
pub fn plan_parts(size: u64, part_size: u64) -> Vec<PartPlan> {
    if size == 0 {
        return Vec::new();
    }

    let mut part_size = part_size.max(MIN_PART_SIZE);
    let min_for_limit = size.div_ceil(MAX_PARTS);
    if part_size < min_for_limit {
        part_size = min_for_limit;
    }

    let mut parts = Vec::new();
    let mut offset = 0;
    let mut number = 1;
    while offset < size {
        let len = part_size.min(size - offset);
        parts.push(PartPlan {
            number,
            offset,
            len,
        });
        offset += len;
        number += 1;
    }
    parts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub number: u32,
    pub etag: String,
}

pub fn complete_body(parts: &[CompletedPart]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_by_key(|p| p.number);

    let mut body = String::from("<CompleteMultipartUpload>");
    for part in sorted {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.number,
            escape(&part.etag)
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_plan_parts_covers_file() {
        let parts = plan_parts(20 * MIB + 5, 8 * MIB);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], PartPlan { number: 1, offset: 0, len: 8 * MIB });
        assert_eq!(parts[2].number, 3);
        assert_eq!(parts[2].offset, 16 * MIB);
        assert_eq!(parts[2].len, 4 * MIB + 5);
        assert_eq!(parts.iter().map(|p| p.len).sum::<u64>(), 20 * MIB + 5);
    }

    #[test]
    fn test_plan_parts_respects_limits() {
        assert!(plan_parts(0, 8 * MIB).is_empty());

        // tiny part size is raised to the minimum
        let parts = plan_parts(MIB, 1);
        assert_eq!(parts[0].len, MIN_PART_SIZE);

        // part count never exceeds the OSS limit
        let size = 200_000 * MIN_PART_SIZE;
        let parts = plan_parts(size, MIN_PART_SIZE);
        assert!(parts.len() as u64 <= MAX_PARTS);
        assert_eq!(parts.iter().map(|p| p.len).sum::<u64>(), size);
    }

    #[test]
    fn test_complete_body_sorted() {
        let body = complete_body(&[
            CompletedPart { number: 2, etag: "\"b\"".into() },
            CompletedPart { number: 1, etag: "\"a\"".into() },
        ]);
        assert_eq!(
            body,
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>&quot;a&quot;</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>&quot;b&quot;</ETag></Part>\
             </CompleteMultipartUpload>"
        );
    }
}
