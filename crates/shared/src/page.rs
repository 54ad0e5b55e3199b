//! # ページ指定
//!
//! 一覧クエリで使用するオフセットベースのページ指定。

use serde::{Deserialize, Serialize};

/// 1 ページあたりの最大件数
pub const MAX_PAGE_LIMIT: u32 = 200;

/// 1 ページあたりのデフォルト件数
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// ページ指定
///
/// `limit` は [`MAX_PAGE_LIMIT`] に丸められる。
///
/// ## JSON 形式
///
/// ```json
/// { "offset": 0, "limit": 50 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PageParams")]
pub struct Page {
    offset: u32,
    limit:  u32,
}

/// デシリアライズ用の未検証パラメータ
#[derive(Deserialize)]
struct PageParams {
    #[serde(default)]
    offset: u32,
    #[serde(default = "default_limit")]
    limit:  u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl From<PageParams> for Page {
    fn from(params: PageParams) -> Self {
        Self::new(params.offset, params.limit)
    }
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// 先頭ページ
    pub fn first(limit: u32) -> Self {
        Self::new(0, limit)
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// スライスにページを適用する
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_limitは上限に丸められる() {
        let page = Page::new(0, 10_000);

        assert_eq!(page.limit(), MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_limit_0は1に丸められる() {
        assert_eq!(Page::new(0, 0).limit(), 1);
    }

    #[test]
    fn test_applyでオフセットと件数が適用される() {
        let page = Page::new(2, 3);

        let result = page.apply((1..=10).collect::<Vec<_>>());

        assert_eq!(result, vec![3, 4, 5]);
    }

    #[test]
    fn test_jsonからデシリアライズできる() {
        let page: Page = serde_json::from_str(r#"{"offset":5,"limit":20}"#).unwrap();

        assert_eq!(page, Page::new(5, 20));
    }

    #[test]
    fn test_jsonの省略値はデフォルトで補われ上限も適用される() {
        let page: Page = serde_json::from_str(r#"{"limit":999}"#).unwrap();
        let default: Page = serde_json::from_str("{}").unwrap();

        assert_eq!(page, Page::new(0, MAX_PAGE_LIMIT));
        assert_eq!(default, Page::default());
    }
}
