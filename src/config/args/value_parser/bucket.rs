const S3_SCHEME: &str = "s3://";

const ERROR_MESSAGE_EMPTY_BUCKET: &str = "bucket name must not be empty.";
const ERROR_MESSAGE_BUCKET_WITH_PATH: &str =
    "expected a bucket name without a key prefix (e.g. my-bucket or s3://my-bucket).";

/// Accepts `my-bucket`, `s3://my-bucket` or `s3://my-bucket/` and returns the bare name.
///
/// The whole bucket is always processed, so a key prefix is rejected.
pub fn check_bucket_name(value: &str) -> Result<String, String> {
    let name = value.trim();
    let name = name.strip_prefix(S3_SCHEME).unwrap_or(name);
    let name = name.strip_suffix('/').unwrap_or(name);

    if name.is_empty() {
        return Err(ERROR_MESSAGE_EMPTY_BUCKET.to_string());
    }
    if name.contains('/') {
        return Err(ERROR_MESSAGE_BUCKET_WITH_PATH.to_string());
    }

    Ok(name.to_string())
}
