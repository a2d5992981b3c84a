pub mod json_file;
pub mod rss;

use anyhow::Result;

use crate::config::digest::{FeedConfig, FeedFormat};
use crate::ingest::types::SourceProvider;

pub use json_file::JsonFileProvider;
pub use rss::RssProvider;

/// Build one provider per configured feed, keeping config order.
pub fn from_config(feeds: &[FeedConfig]) -> Result<Vec<Box<dyn SourceProvider>>> {
    let mut out: Vec<Box<dyn SourceProvider>> = Vec::with_capacity(feeds.len());
    for f in feeds {
        let p: Box<dyn SourceProvider> = match (f.format, &f.url, &f.path) {
            (FeedFormat::Json, _, Some(path)) => Box::new(JsonFileProvider::new(&f.id, path)),
            (FeedFormat::Rss, _, Some(path)) => Box::new(RssProvider::from_file(&f.id, path)),
            (FeedFormat::Rss, Some(url), None) => Box::new(RssProvider::from_url(&f.id, url)?),
            (FeedFormat::Json, Some(_), None) | (_, None, None) => {
                anyhow::bail!("feed `{}` needs a `path` for format {:?}", f.id, f.format)
            }
        };
        out.push(p);
    }
    Ok(out)
}
