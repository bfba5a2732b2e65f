//! `sitemap.xml` generation.

use std::io;
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::routes::SiteIndex;

pub const SITEMAP_FILE: &str = "sitemap.xml";
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

pub fn output_path() -> &'static Path {
    Path::new(SITEMAP_FILE)
}

/// One `<url>` per page, sorted by URL. `lastmod` is only written for pages
/// with a date.
pub fn render(site: &SiteIndex) -> io::Result<Vec<u8>> {
    let mut pages: Vec<_> = site.pages().iter().collect();
    pages.sort_by(|a, b| a.route.url.cmp(&b.route.url));

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
    ))?;

    for page in pages {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        text_element(&mut writer, "loc", &page.permalink)?;
        if let Some(date) = page.meta.date {
            text_element(&mut writer, "lastmod", &date.format("%Y-%m-%d").to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;

    let mut xml = writer.into_inner();
    xml.push(b'\n');
    Ok(xml)
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}
