/// Full-window player page for a video with one subtitle track
pub fn video_page(video_url: &str, subtitles_url: &str, language: &str) -> String {
    let label = capitalize(language);
    let srclang: String = language.to_lowercase().chars().take(2).collect();
    format!(
        r#"<video controls style="position: fixed; top: 0; left: 0; width: 100vw; height: 100vh; object-fit: cover;">
    <source src="{video_url}" type="video/mp4">
    <track src="{subtitles_url}" kind="subtitles" srclang="{srclang}" label="{label}">
    Your browser does not support the video tag.
</video>"#
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_page() {
        let page = video_page("https://h/media/m.mp4?x-token=t", "https://h/media/m.en.vtt?x-token=t", "ENGLISH");
        assert!(page.contains(r#"<source src="https://h/media/m.mp4?x-token=t" type="video/mp4">"#));
        assert!(page.contains(r#"srclang="en" label="English""#));
        assert!(page.starts_with("<video controls"));
        assert!(page.ends_with("</video>"));
    }
}
