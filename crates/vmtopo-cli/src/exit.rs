// Exit codes for scripted callers
pub const EXIT_FAIL: i32 = 1;
