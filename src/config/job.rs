use serde::Deserialize;

use super::settings::OutputMode;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// PDF file, or a directory of `page_<n>` images.
    pub input: String,
    /// Parent directory of the timestamped run directory.
    pub output: String,
    #[serde(default, deserialize_with = "deserialize_pages")]
    pub pages: Option<PageRange>,
    pub dpi: Option<u32>,
    pub chunk_size: Option<usize>,
    pub resize_width: Option<u32>,
    pub enhance: Option<bool>,
    pub output_mode: Option<OutputMode>,
}

/// 1-based inclusive page range. `end < start` is the empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        PageRange { start, end }
    }

    pub fn empty() -> Self {
        PageRange { start: 1, end: 0 }
    }

    /// Every page of a document with `page_count` pages.
    pub fn all(page_count: u32) -> Self {
        PageRange {
            start: 1,
            end: page_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "(empty)")
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// ページ範囲文字列をパースする。
///
/// 形式:
/// - 単一ページ: `"5"`
/// - 範囲: `"19-393"`
///
/// ページ番号は1始まり。`start > end` はエラー。
pub fn parse_page_range(s: &str) -> crate::error::Result<PageRange> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(crate::error::PageCropError::config(
            "Page range cannot be empty",
        ));
    }

    let parse_page = |part: &str| -> crate::error::Result<u32> {
        let page: u32 = part.trim().parse().map_err(|_| {
            crate::error::PageCropError::config(format!("Invalid page number: '{}'", part.trim()))
        })?;
        if page == 0 {
            return Err(crate::error::PageCropError::config(
                "Page numbers start at 1",
            ));
        }
        Ok(page)
    };

    let (start, end) = match trimmed.split_once('-') {
        Some((start_str, end_str)) => (parse_page(start_str)?, parse_page(end_str)?),
        None => {
            let page = parse_page(trimmed)?;
            (page, page)
        }
    };

    if start > end {
        return Err(crate::error::PageCropError::config(format!(
            "Invalid page range: start ({start}) > end ({end})"
        )));
    }

    Ok(PageRange::new(start, end))
}

/// serdeのdeserialize_withで使用するページ範囲デシリアライザ
fn deserialize_pages<'de, D>(deserializer: D) -> Result<Option<PageRange>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // YAML の `pages: 5` は数値として届くため文字列と両方受け付ける
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPages {
        Number(u32),
        Text(String),
    }

    match Option::<RawPages>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPages::Number(n)) => parse_page_range(&n.to_string())
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(RawPages::Text(s)) => parse_page_range(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
