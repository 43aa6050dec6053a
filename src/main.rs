use stress_test::{stress_test_sessions, stress_test_scaling};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> trellis_sync::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            COLLABORATIVE EDITING STRESS TESTS              ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: a few peers, short session
    let stats = stress_test_sessions(3, 10, 20, 1).await?;
    stats.print();

    // Test 2: more peers, longer session
    let stats = stress_test_sessions(6, 40, 25, 2).await?;
    stats.print();

    // Test 3: scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (peers)                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(8, 2).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
