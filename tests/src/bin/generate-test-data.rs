//! Prints SQL filling a threadboard database with the demo thread, plus
//! random filler threads. Pipe into `sqlite3 <db file>` after migrating.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_FILLER_COMMENTS: usize = 200;
const FILLER_TOP_LEVEL_PERCENT: u32 = 20;
const COMMENT_WORD_COUNT: usize = 25;

const USERS: [(&str, u32); 5] = [
    ("Alex", 1),
    ("George", 2),
    ("Masha", 3),
    ("Syed", 4),
    ("Julia", 5),
];

fn blob(u: Uuid) -> String {
    format!("X'{}'", u.simple())
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn gen_n_items(table: &str, rows: Vec<String>) {
    if rows.is_empty() {
        return;
    }
    println!("INSERT INTO {} VALUES", table);
    for (i, r) in rows.iter().enumerate() {
        if i != 0 {
            println!(",");
        }
        print!("    {}", r);
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

struct Comment {
    id: Uuid,
    author: Uuid,
    parent: Option<Uuid>,
    content: String,
    date: DateTime<Utc>,
}

impl Comment {
    fn to_sql(&self) -> String {
        let ms = self.date.timestamp_millis();
        format!(
            "({}, {}, {}, {}, {}, {})",
            blob(self.id),
            blob(self.author),
            self.parent.map(blob).unwrap_or_else(|| String::from("NULL")),
            quote(&self.content),
            ms,
            ms,
        )
    }
}

fn date(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
        .single()
        .expect("demo dates are valid")
}

fn main() {
    let mut rng = rand::thread_rng();

    // Generate users
    let users = USERS
        .iter()
        .map(|(name, img)| (Uuid::new_v4(), *name, *img))
        .collect::<Vec<_>>();
    gen_n_items(
        "users",
        users
            .iter()
            .map(|(id, name, img)| {
                format!(
                    "({}, {}, {}, {})",
                    blob(*id),
                    quote(name),
                    quote(&format!("{}@example.com", name.to_lowercase())),
                    quote(&format!("https://i.pravatar.cc/60?img={img}")),
                )
            })
            .collect(),
    );
    let user = |name: &str| -> Uuid {
        users
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(id, _, _)| *id)
            .expect("demo user exists")
    };

    // The demo thread
    let mut comments = Vec::new();
    let mut push = |author: &str, parent: Option<Uuid>, content: &str, date: DateTime<Utc>| {
        let id = Uuid::new_v4();
        comments.push(Comment {
            id,
            author: user(author),
            parent,
            content: String::from(content),
            date,
        });
        id
    };
    let alex = push(
        "Alex",
        None,
        "Has anyone tried the new threaded comments yet?",
        date(2017, 7, 10, 9, 0),
    );
    let george = push(
        "George",
        Some(alex),
        "Yes! Replies to replies work nicely.",
        date(2017, 7, 10, 11, 6),
    );
    let masha = push(
        "Masha",
        Some(george),
        "And they alternate sides as they nest.",
        date(2017, 7, 11, 5, 20),
    );
    push(
        "Julia",
        None,
        "Is there a way to collapse long threads?",
        date(2017, 7, 11, 16, 28),
    );
    push(
        "Syed",
        Some(masha),
        "Deep replies get highlighted too.",
        date(2017, 7, 12, 6, 15),
    );

    // Random filler, always posted after its parent
    let mut last = date(2017, 7, 13, 8, 0);
    for _ in 0..NUM_FILLER_COMMENTS {
        last = last + Duration::minutes(rng.gen_range(1..600));
        let parent = match rng.gen_ratio(FILLER_TOP_LEVEL_PERCENT, 100) {
            true => None,
            false => comments.choose(&mut rng).map(|c| c.id),
        };
        let author = users.choose(&mut rng).map(|(id, _, _)| *id).expect("users exist");
        comments.push(Comment {
            id: Uuid::new_v4(),
            author,
            parent,
            content: lipsum::lipsum_words(COMMENT_WORD_COUNT),
            date: last,
        });
    }

    comments.sort_by_key(|c| c.date);
    gen_n_items("comments", comments.iter().map(Comment::to_sql).collect());
}
