/// Load the `.env` file if one is present (silently ignores if missing).
///
/// Call this before parsing CLI arguments so that env-backed flags see
/// the values from `.env`.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}
