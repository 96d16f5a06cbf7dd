use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// 每页条数: 有限正整数或 "all" (一页返回全部)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageSize {
    Limited(NonZeroU32),
    All,
}

impl PageSize {
    pub fn limited(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self::Limited)
    }

    /// LIMIT 值, All 时为 None
    pub fn limit(&self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(n.get()),
            Self::All => None,
        }
    }

    /// 超过上限时截断
    pub fn capped(self, max: u32) -> Self {
        match (self, NonZeroU32::new(max)) {
            (Self::Limited(n), Some(cap)) if n > cap => Self::Limited(cap),
            _ => self,
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::limited)
            .ok_or_else(|| format!("invalid page size: {}", s))
    }
}

impl TryFrom<String> for PageSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PageSize> for String {
    fn from(value: PageSize) -> Self {
        value.to_string()
    }
}

/// 搜索请求参数 (页码从 1 开始)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub page: u32,
    pub page_size: PageSize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, page: u32, page_size: PageSize) -> Self {
        Self {
            text: text.into(),
            page: page.max(1),
            page_size,
        }
    }

    /// 偏移量, All 时恒为 0
    pub fn offset(&self) -> u64 {
        match self.page_size {
            PageSize::Limited(n) => u64::from(self.page - 1) * u64::from(n.get()),
            PageSize::All => 0,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
    pub page_size: PageSize,
}

impl<T> Page<T> {
    /// 根据总数和本页数据组装分页元数据
    pub fn from_parts(items: Vec<T>, query: &SearchQuery, total: u64) -> Self {
        let (current_page, last_page) = match query.page_size {
            PageSize::Limited(n) => (query.page, last_page_for(total, n.get())),
            PageSize::All => (1, 1),
        };
        Self {
            items,
            current_page,
            last_page,
            total,
            page_size: query.page_size,
        }
    }

    /// 对内存中的全部匹配结果切页
    pub fn paginate(all: Vec<T>, query: &SearchQuery) -> Self {
        let total = all.len() as u64;
        let items: Vec<T> = match query.page_size {
            PageSize::Limited(n) => all
                .into_iter()
                .skip(query.offset() as usize)
                .take(n.get() as usize)
                .collect(),
            PageSize::All => all,
        };
        Self::from_parts(items, query, total)
    }

    /// 元数据是否与本页条数一致
    pub fn is_consistent(&self) -> bool {
        if self.current_page == 0 || self.last_page == 0 {
            return false;
        }
        let len = self.items.len() as u64;
        match self.page_size {
            PageSize::All => self.current_page == 1 && self.last_page == 1 && len == self.total,
            PageSize::Limited(n) => {
                let n = u64::from(n.get());
                if self.last_page != last_page_for(self.total, n as u32) {
                    return false;
                }
                let before = u64::from(self.current_page - 1) * n;
                let expected = self.total.saturating_sub(before).min(n);
                len == expected
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn last_page_for(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(page_size));
    pages.max(1).min(u64::from(u32::MAX)) as u32
}
