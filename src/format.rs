use bytesize::ByteSize;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Human-readable size for summaries and log lines.
pub fn format_size(bytes: u64) -> String {
    ByteSize(bytes).to_string_as(true)
}

/// Thresholds are entered in megabytes; scanning works in bytes.
pub fn megabytes_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(BYTES_PER_MB)
}
