//! Artifact post-processing: title header, duplicate heading removal and
//! provenance footer.

use super::request::ContentGenerationRequest;

/// Wrap generated `content` for writing.
///
/// A leading heading that mentions any word of the feature name is dropped,
/// since the header already carries the title.
pub fn post_process(content: &str, request: &ContentGenerationRequest, timestamp: &str) -> String {
    let ctx = &request.context;
    let mut body = content.trim();

    let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
    if first.starts_with('#') && echoes_feature(first, &ctx.feature_name) {
        body = rest.trim();
    }

    let mut out = format!("# {} - {}\n\n", ctx.feature_name, request.content_type.label());
    out.push_str(&format!("*Generated by automated workflow on {timestamp}*\n\n"));
    out.push_str(body);
    out.push_str("\n\n---\n");
    out.push_str(&format!(
        "*Generated by: {} | Step: {} | Phase: {}*\n",
        request.document_name(),
        ctx.step,
        ctx.phase
    ));
    out
}

fn echoes_feature(heading: &str, feature_name: &str) -> bool {
    let heading = heading.to_lowercase();
    feature_name.to_lowercase().split_whitespace().any(|word| heading.contains(word))
}
