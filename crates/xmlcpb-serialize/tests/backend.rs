//! Game objects persisted through the backend traits.

use tempfile::TempDir;
use xmlcpb::Reader;
use xmlcpb_serialize::{LoadBackend, Result, SaveBackend, XmlCpbLoader, XmlCpbSaver};

#[derive(Debug, Default, PartialEq)]
struct Item {
    class: String,
    count: i32,
}

#[derive(Debug, Default, PartialEq)]
struct Player {
    name: String,
    health: f32,
    pos: [f32; 3],
    rot: [f32; 4],
    items: Vec<Item>,
    blob: Vec<u8>,
}

impl Player {
    fn save(&self, out: &mut dyn SaveBackend) -> Result<()> {
        out.begin_group("Player")?;
        out.value("name", self.name.as_str().into())?;
        out.value("health", self.health.into())?;
        out.value("pos", self.pos.into())?;
        out.value("rot", self.rot.into())?;
        out.value("numItems", (self.items.len() as u32).into())?;
        out.value_bytes("blob", &self.blob)?;
        out.begin_group("Inventory")?;
        for item in &self.items {
            out.begin_group("Item")?;
            out.value("class", item.class.as_str().into())?;
            out.value("count", item.count.into())?;
            out.end_group()?;
        }
        out.end_group()?;
        out.end_group()
    }

    fn load(input: &mut dyn LoadBackend) -> Result<Option<Self>> {
        if !input.begin_group("Player")? {
            return Ok(None);
        }
        let mut player = Player {
            name: input.value("name").map(|v| v.to_string()).unwrap_or_default(),
            blob: input.value_bytes("blob").unwrap_or_default().to_vec(),
            ..Player::default()
        };
        if let Some(xmlcpb::AttrValue::Float(health)) = input.value("health") {
            player.health = health;
        }
        if let Some(xmlcpb::AttrValue::Vec3(pos)) = input.value("pos") {
            player.pos = pos;
        }
        if let Some(xmlcpb::AttrValue::Quat(rot)) = input.value("rot") {
            player.rot = rot;
        }
        let num_items = match input.value("numItems") {
            Some(xmlcpb::AttrValue::Int32(n)) => n as usize,
            _ => 0,
        };

        if input.begin_group("Inventory")? {
            for _ in 0..num_items {
                if !input.begin_group("Item")? {
                    break;
                }
                let class = input.value("class").map(|v| v.to_string()).unwrap_or_default();
                let count = match input.value("count") {
                    Some(xmlcpb::AttrValue::Int32(n)) => n,
                    _ => 0,
                };
                player.items.push(Item { class, count });
                input.end_group()?;
            }
            input.end_group()?;
        }
        input.end_group()?;
        Ok(Some(player))
    }
}

fn sample() -> Player {
    Player {
        name: "Bob".into(),
        health: 87.5,
        pos: [10.0, 0.0, -3.25],
        rot: [0.0, 0.0, 0.0, 1.0],
        items: vec![
            Item {
                class: "Rifle".into(),
                count: 1,
            },
            Item {
                class: "Ammo".into(),
                count: 120,
            },
            Item {
                class: "Ammo".into(),
                count: 30,
            },
        ],
        blob: vec![1, 2, 3, 0, 4],
    }
}

#[test]
fn test_player_round_trip_in_memory() {
    let player = sample();
    let mut saver = XmlCpbSaver::new("Save");
    player.save(&mut saver).unwrap();
    assert_eq!(saver.depth(), 0);
    let data = saver.finish_into_memory().unwrap();

    let reader = Reader::read_binary_memory(&data).unwrap();
    let mut loader = XmlCpbLoader::new(&reader).unwrap();
    let loaded = Player::load(&mut loader).unwrap();
    assert_eq!(loaded, Some(player));
    assert_eq!(loader.depth(), 0);
}

#[test]
fn test_player_round_trip_in_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("profile.xmlcpb");

    let player = sample();
    let mut saver = XmlCpbSaver::create_file(&path, "Save").unwrap();
    player.save(&mut saver).unwrap();
    saver.save("version", 3).unwrap();
    let stats = saver.finish_file().unwrap();
    assert!(!stats.has_internal_error);

    let reader = Reader::read_binary_file(&path).unwrap();
    let mut loader = XmlCpbLoader::new(&reader).unwrap();
    assert_eq!(loader.load::<i32>("version"), Some(3));
    assert_eq!(Player::load(&mut loader).unwrap(), Some(player));
}

#[test]
fn test_missing_group_is_not_an_error() {
    let saver = XmlCpbSaver::new("Save");
    let data = saver.finish_into_memory().unwrap();

    let reader = Reader::read_binary_memory(&data).unwrap();
    let mut loader = XmlCpbLoader::new(&reader).unwrap();
    assert_eq!(Player::load(&mut loader).unwrap(), None);
    assert!(!loader.have_value("anything"));
    assert!(loader.end_group().is_err());
}
