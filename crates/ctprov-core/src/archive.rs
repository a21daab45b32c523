#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    TarGz,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "zip" => Some(Self::Zip),
            "tar.gz" | "tgz" => Some(Self::TarGz),
            _ => None,
        }
    }

    pub fn infer_from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        let without_fragment = lower.split('#').next().unwrap_or(&lower);
        let without_query = without_fragment
            .split('?')
            .next()
            .unwrap_or(without_fragment);

        if without_query.ends_with(".zip") {
            return Some(Self::Zip);
        }
        if without_query.ends_with(".tar.gz") || without_query.ends_with(".tgz") {
            return Some(Self::TarGz);
        }

        None
    }
}
