pub mod earthquake;

pub async fn health() -> &'static str {
    "ok"
}
