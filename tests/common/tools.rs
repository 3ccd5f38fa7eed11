//! Fake external tools written as shell scripts

use std::path::{Path, PathBuf};

/// Write an executable `sh` script named `name` into `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut permissions = std::fs::metadata(&path).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("chmod script");
    path
}

/// SteamCMD stand-in for `workshop_download_item`
///
/// Arguments arrive as `+force_install_dir DIR +login USER
/// +workshop_download_item APP ID validate +quit`; the item is written as
/// `<DIR>/steamapps/workshop/content/<APP>/<ID>/<file_name>`.
#[cfg(unix)]
pub fn fake_steamcmd_download(dir: &Path, file_name: &str, contents: &str) -> PathBuf {
    write_script(
        dir,
        "steamcmd.sh",
        &format!(
            r#"echo "Steam Console Client (c) Valve Corporation"
echo "args: $*" > "$2/last_args.txt"
item="$2/steamapps/workshop/content/$6/$7"
mkdir -p "$item"
printf '%s' '{contents}' > "$item/{file_name}"
echo "Success. Downloaded item $7 to \"$item\""
exit 0"#
        ),
    )
}

/// SteamCMD stand-in for `workshop_build_item` that records the manifest
/// and writes `new_id` back into it
#[cfg(unix)]
pub fn fake_steamcmd_publish(dir: &Path, new_id: u64) -> PathBuf {
    let record = dir.join("uploaded.vdf");
    write_script(
        dir,
        "steamcmd.sh",
        &format!(
            r#"vdf="$4"
cp "$vdf" "{record}"
sed -i.bak 's/"publishedfileid".*/"publishedfileid" "{new_id}"/' "$vdf"
echo "Success."
exit 0"#,
            record = record.display()
        ),
    )
}

/// gmad stand-in: `create -folder IN -out OUT` writes a GMA with the file list
///
/// The packed file list and the `addon.json` it saw are also copied next to
/// the script as `gmad_listing.txt` and `gmad_addon.json`.
#[cfg(unix)]
pub fn fake_gmad(dir: &Path) -> PathBuf {
    let listing = dir.join("gmad_listing.txt");
    let manifest = dir.join("gmad_addon.json");
    write_script(
        dir,
        "gmad",
        &format!(
            r#"in="$3"
out="$5"
(cd "$in" && find . -type f | sort) > "{listing}"
cp "$in/addon.json" "{manifest}" 2>/dev/null
printf 'GMAD' > "$out"
cat "{listing}" >> "$out"
echo "Successfully saved to \"$out\""
exit 0"#,
            listing = listing.display(),
            manifest = manifest.display()
        ),
    )
}

/// A tool that always fails with `code`
#[cfg(unix)]
pub fn failing_tool(dir: &Path, name: &str, code: i32) -> PathBuf {
    write_script(dir, name, &format!("echo \"fatal error\" >&2\nexit {code}"))
}

/// Helper stand-in that records its arguments in `helper_args.txt` and then runs `body`
#[cfg(unix)]
pub fn fake_helper(dir: &Path, body: &str) -> PathBuf {
    let record = dir.join("helper_args.txt");
    write_script(
        dir,
        "helper.sh",
        &format!("echo \"$*\" > \"{}\"\n{body}", record.display()),
    )
}

/// SteamCMD stand-in that touches `marker` and then hangs until killed
#[cfg(unix)]
pub fn hanging_steamcmd(dir: &Path, marker: &Path) -> PathBuf {
    write_script(
        dir,
        "steamcmd.sh",
        &format!(
            "echo \"Logging in...\"\ntouch \"{}\"\nexec sleep 30",
            marker.display()
        ),
    )
}
