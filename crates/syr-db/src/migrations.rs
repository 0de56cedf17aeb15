use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS services (
            id            TEXT PRIMARY KEY,
            display_name  TEXT NOT NULL,
            icon_ref      TEXT NOT NULL,
            color_ref     TEXT NOT NULL,
            CHECK (id <> 'tous')
        );

        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            service_id  TEXT NOT NULL REFERENCES services(id)
        );

        CREATE INDEX IF NOT EXISTS idx_users_login
            ON users(username, service_id);

        CREATE TABLE IF NOT EXISTS messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            from_user     TEXT NOT NULL,
            from_service  TEXT NOT NULL,
            to_service    TEXT NOT NULL,
            message_type  TEXT NOT NULL CHECK (message_type IN ('public', 'private')),
            content       TEXT,
            file_name     TEXT,
            file_url      TEXT,
            file_type     TEXT,
            reply_to      INTEGER REFERENCES messages(id),
            created_at    TEXT NOT NULL,
            read_by       TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_messages_order
            ON messages(created_at, id);

        CREATE INDEX IF NOT EXISTS idx_messages_private
            ON messages(message_type, from_service, to_service);

        -- Seed the departments
        INSERT OR IGNORE INTO services (id, display_name, icon_ref, color_ref) VALUES
            ('directeur',     'Directeur',        'crown',     '#8e44ad'),
            ('kwin',          'Kwin',             'star',      '#16a085'),
            ('ingénieur',     'Ingénieur',        'gear',      '#2980b9'),
            ('secrétariat',   'Secrétariat',      'file-text', '#d35400'),
            ('comptable',     'Comptable',        'calculator','#27ae60'),
            ('gestionnaire',  'Gestionnaire',     'briefcase', '#2c3e50'),
            ('personnel',     'Personnel',        'users',     '#c0392b'),
            ('commercial',    'Commercial',       'handshake', '#f39c12'),
            ('magasin',       'Magasin',          'box',       '#7f8c8d'),
            ('démarcheur',    'Démarcheur',       'map-pin',   '#e67e22'),
            ('chef_atelier',  'Chef d''atelier',  'wrench',    '#34495e'),
            ('chef_chantier', 'Chef de chantier', 'hard-hat',  '#f1c40f');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
