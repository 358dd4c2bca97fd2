use colored::Colorize;
use flotilla_cloud_azure::deploy;
use std::path::Path;

pub async fn handle(config: Option<&Path>, delete_vnet: bool, wait: bool) -> anyhow::Result<()> {
    println!("{}", "仮想マシン群を撤去中...".yellow());
    let settings = super::load_settings(config)?;
    let vm_resource = &settings.virtual_machines;
    let client = super::build_client(&settings)?;

    println!(
        "リソースグループ: {}",
        vm_resource.resource_group.cyan()
    );
    if !wait {
        println!("{}", "削除の完了は待ちません".dimmed());
    }

    let summary =
        deploy::teardown_virtual_machines(&client, vm_resource, delete_vnet, wait).await?;

    println!();
    for name in &summary.deleted_virtual_machines {
        println!("  ✓ {} を削除", name.cyan());
    }
    for name in &summary.missing_virtual_machines {
        println!("  ℹ {} は存在しません", name);
    }
    if !summary.deleted_resources.is_empty() {
        println!(
            "{}",
            format!("関連リソース ({} 個):", summary.deleted_resources.len()).bold()
        );
        for name in &summary.deleted_resources {
            println!("  • {}", name);
        }
    }
    println!();
    println!("{}", "✓ 撤去が完了しました".green().bold());

    Ok(())
}
