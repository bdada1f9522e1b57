use crate::error::PipelineError;

/// Nucleotide symbols kept by the sanitizer, in sorted order.
pub const NUCLEOTIDES: [u8; 4] = *b"ACGT";

/// A non-empty sequence made only of `A`, `C`, `G` and `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSequence(Vec<u8>);

impl SanitizedSequence {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    // Always false; construction rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distinct symbols present, sorted.
    pub fn distinct_symbols(&self) -> Vec<u8> {
        NUCLEOTIDES
            .iter()
            .copied()
            .filter(|s| self.0.contains(s))
            .collect()
    }
}

fn is_nucleotide(b: u8) -> bool {
    NUCLEOTIDES.contains(&b)
}

/// Strip FASTA header lines and whitespace, uppercase, and keep only
/// nucleotide symbols.
pub fn sanitize(text: &str) -> Result<SanitizedSequence, PipelineError> {
    let mut seq = Vec::with_capacity(text.len());

    for line in text.split('\n') {
        if line.starts_with('>') {
            continue;
        }
        seq.extend(
            line.bytes()
                .filter(|b| !b.is_ascii_whitespace())
                .map(|b| b.to_ascii_uppercase())
                .filter(|&b| is_nucleotide(b)),
        );
    }

    if seq.is_empty() {
        return Err(PipelineError::EmptySequence);
    }

    Ok(SanitizedSequence(seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sequence() {
        let seq = sanitize("ATGCATGCATGC").unwrap();
        assert_eq!(seq.as_bytes(), b"ATGCATGCATGC");
        assert_eq!(seq.len(), 12);
    }

    #[test]
    fn test_fasta_headers_removed() {
        let text = ">Test sequence\nATGCATGC\nATGCATGC\n>second record\nGGCC\n";
        let seq = sanitize(text).unwrap();
        assert_eq!(seq.as_bytes(), b"ATGCATGCATGCATGCGGCC");
    }

    #[test]
    fn test_trailing_header_without_newline() {
        let seq = sanitize("ACGT\n>GATTACA").unwrap();
        assert_eq!(seq.as_bytes(), b"ACGT");
    }

    #[test]
    fn test_lowercase_and_noise() {
        let seq = sanitize("acgtn NNxx\r\n12 t\tg").unwrap();
        assert_eq!(seq.as_bytes(), b"ACGTTG");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        for text in ["", "   \n\t", "xyz123", "NNNN", ">only a header\n"] {
            assert!(
                matches!(sanitize(text), Err(PipelineError::EmptySequence)),
                "expected EmptySequence for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_distinct_symbols() {
        let seq = sanitize("GGAAGA").unwrap();
        assert_eq!(seq.distinct_symbols(), b"AG".to_vec());
    }
}
