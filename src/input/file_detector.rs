//! File type detection

#[derive(Debug, Clone, PartialEq)]
pub enum FileType {
    Csv,
    Tsv,
    Unknown,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "csv" | "txt" => FileType::Csv,
            "tsv" | "tab" => FileType::Tsv,
            _ => FileType::Unknown,
        }
    }

    /// Field delimiter implied by the file type, if it fixes one
    pub fn default_delimiter(&self) -> Option<u8> {
        match self {
            FileType::Tsv => Some(b'\t'),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(FileType::from_extension("CSV"), FileType::Csv);
        assert_eq!(FileType::from_extension("tsv"), FileType::Tsv);
        assert_eq!(FileType::from_extension("xlsx"), FileType::Unknown);
        assert_eq!(FileType::Tsv.default_delimiter(), Some(b'\t'));
        assert_eq!(FileType::Csv.default_delimiter(), None);
    }
}
