#[actix_web::main]
async fn main() -> std::io::Result<()> {
    salary_slip_server::run().await
}
