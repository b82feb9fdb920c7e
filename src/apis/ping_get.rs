#[get("/v1/ping")]
pub fn ping_get() -> String {
    json!({ "status": "ok" }).to_string()
}
