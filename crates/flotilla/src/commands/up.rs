use colored::Colorize;
use flotilla_cloud_azure::deploy;
use std::path::Path;

pub async fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "仮想マシン群を構築中...".green());
    let settings = super::load_settings(config)?;
    let vm_resource = &settings.virtual_machines;
    let ssh_public_key = vm_resource.ssh.public_key_data()?;
    let client = super::build_client(&settings)?;

    println!(
        "リソースグループ: {} ({})",
        vm_resource.resource_group.cyan(),
        vm_resource.location
    );
    println!(
        "{}",
        format!("仮想マシン ({} 台):", vm_resource.vm_count).bold()
    );

    let summaries =
        deploy::provision_virtual_machines(&client, vm_resource, &ssh_public_key).await?;

    println!();
    for vm in &summaries {
        println!("  ✓ {}", vm.name.cyan());
        println!(
            "    private: {}  public: {}",
            vm.private_ip.as_deref().unwrap_or("-"),
            vm.public_ip.as_deref().unwrap_or("-")
        );
        if let Some(fqdn) = &vm.fqdn {
            println!("    fqdn: {}", fqdn);
        }
    }
    println!();
    println!("{}", "✓ 構築が完了しました！".green().bold());

    Ok(())
}
