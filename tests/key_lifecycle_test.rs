use firmware_site_lib::engine::crypto::{Algorithm, AsymmetricCipher, FileSigner, KeyConfig, KeyManager, TransportEncoding};
use firmware_site_lib::engine::database::Database;
use firmware_site_lib::engine::keystore::SqliteKeyStore;
use std::sync::Arc;

fn manager(db: &Database, config: KeyConfig) -> KeyManager {
    KeyManager::new(Arc::new(SqliteKeyStore::new(db.clone())), config)
}

#[test]
fn test_corrupt_stored_key_is_replaced_once() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let db = Database::new(&root.path().join("data").join("FirmwareSite.db"))?;
    let config = KeyConfig::new(Algorithm::Rsa, 1024);

    db.insert_vendor_keys(b"not a key", b"also not a key")?;

    let mut keys = manager(&db, config);
    keys.initialize()?;
    assert_eq!(db.vendor_key_count()?, 2);

    // Initializing again keeps the active pair
    keys.initialize()?;
    assert_eq!(db.vendor_key_count()?, 2);

    let (stored_public, _) = db.latest_vendor_keys()?.ok_or("no stored keys")?;
    assert_eq!(stored_public, keys.public_key_der()?);

    // A restarted process picks up the regenerated pair
    let mut restarted = manager(&db, config);
    restarted.initialize()?;
    assert_eq!(db.vendor_key_count()?, 2);
    assert_eq!(restarted.public_key_der()?, keys.public_key_der()?);

    // Ciphertext from before the restart still decrypts
    let cipher = AsymmetricCipher::new(TransportEncoding::Hex);
    let text = cipher.encrypt_encoded(b"Firmware Update\nVersion: 2\n", keys.public_key()?)?;
    assert_eq!(
        cipher.decrypt_encoded(&text, restarted.private_key()?)?,
        b"Firmware Update\nVersion: 2\n"
    );
    Ok(())
}

#[test]
fn test_rotation_invalidates_old_signatures() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let db = Database::new(&root.path().join("site.db"))?;
    let config = KeyConfig::new(Algorithm::Ed25519, 0);

    let mut keys = manager(&db, config);
    keys.initialize()?;
    let signature = FileSigner::sign(b"Version: 1\n", keys.private_key()?)?;
    let old_public = keys.public_key()?.clone();

    keys.generate()?;
    assert_eq!(db.vendor_key_count()?, 2);
    assert!(FileSigner::verify(b"Version: 1\n", &signature, &old_public)?);
    assert!(!FileSigner::verify(b"Version: 1\n", &signature, keys.public_key()?)?);

    let mut restarted = manager(&db, config);
    restarted.initialize()?;
    assert_eq!(restarted.public_key_der()?, keys.public_key_der()?);
    Ok(())
}

#[test]
fn test_algorithm_change_regenerates() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let db = Database::new(&root.path().join("site.db"))?;

    let mut ed = manager(&db, KeyConfig::new(Algorithm::Ed25519, 0));
    ed.initialize()?;

    // Stored Ed25519 bytes do not decode as RSA, so a new pair is made
    let mut rsa = manager(&db, KeyConfig::new(Algorithm::Rsa, 1024));
    rsa.initialize()?;
    assert_eq!(rsa.public_key()?.algorithm(), Algorithm::Rsa);
    assert_eq!(db.vendor_key_count()?, 2);
    Ok(())
}
